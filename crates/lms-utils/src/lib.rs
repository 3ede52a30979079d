pub mod log {
    pub mod logger;
}

pub mod paths {
    pub mod fixtures;
}
