use futures::future::try_join_all;
use lms_host_traits::session::{ConnectorInner, Error, NamespaceHandle};

use crate::config::ModelTarget;
use crate::status::{StatusReporter, UnloadStatus};

/// Unloads one model, treating "not loaded" as success.
///
/// The status is reported as soon as the request finishes. Any error other
/// than `ModelNotFound` is returned untouched and nothing is reported.
pub async fn unload_one(
    handle: NamespaceHandle<'_>,
    identifier: &str,
    reporter: &dyn StatusReporter,
) -> Result<UnloadStatus, Error> {
    log::debug!("Unloading {} model '{}'", handle.kind(), identifier);

    let status = match handle.unload(identifier).await {
        Ok(()) => UnloadStatus::Unloaded(identifier.to_string()),
        Err(err) if err.is_model_not_found() => {
            log::debug!("'{}' was not loaded: {}", identifier, err);
            UnloadStatus::NotLoaded(identifier.to_string())
        }
        Err(err) => {
            log::warn!("Unloading '{}' failed: {}", identifier, err);
            return Err(err);
        }
    };

    reporter.report(&status);
    Ok(status)
}

/// Opens one session and unloads every model in `models` concurrently on it.
///
/// The first fatal error aborts the remaining requests. The session is
/// released on every path, including when the returned future is dropped.
pub async fn unload_all(
    connector: &dyn ConnectorInner,
    models: &[ModelTarget],
    reporter: &dyn StatusReporter,
) -> Result<(), Error> {
    let session = connector.connect().await?;

    let attempts = models.iter().map(|model| {
        unload_one(
            session.namespace(model.namespace),
            &model.identifier,
            reporter,
        )
    });
    let statuses = try_join_all(attempts).await?;

    let unloaded = statuses
        .iter()
        .filter(|s| matches!(s, UnloadStatus::Unloaded(_)))
        .count();
    log::info!(
        "Unloaded {} of {} models ({} were not loaded)",
        unloaded,
        statuses.len(),
        statuses.len() - unloaded
    );

    session.close();
    Ok(())
}
