use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::join_path;
use crate::service::LogPageService;
use crate::state::DriverLogConversionMode;

/// Rewrite a cluster-internal container log URL with `mode`.
///
/// Returns `None` when the mode does not apply, e.g. `WithPort` for a URL
/// without an explicit port.
pub fn convert_log_url(
    mode: DriverLogConversionMode,
    internal: &Url,
    gateway: &Url,
) -> Option<Url> {
    let host = internal.host_str()?;
    let path = internal.path();
    let mut converted = match mode {
        DriverLogConversionMode::WithoutPort => {
            join_path(gateway, &format!("yarnui/{host}{path}")).ok()?
        }
        DriverLogConversionMode::WithPort => {
            let port = internal.port()?;
            join_path(gateway, &format!("yarnui/{host}/port/{port}{path}")).ok()?
        }
        DriverLogConversionMode::Original => return Some(internal.clone()),
    };
    converted.set_query(internal.query());
    Some(converted)
}

/// Finds an externally reachable address for a job's driver logs.
///
/// The first conversion mode whose URL answers with a status below 300 is
/// remembered for the rest of the job; later resolutions reuse it without
/// probing.
pub struct LogUrlResolver {
    gateway: Url,
    pages: Arc<dyn LogPageService>,
    confirmed: Mutex<Option<DriverLogConversionMode>>,
}

impl LogUrlResolver {
    pub fn new(gateway: Url, pages: Arc<dyn LogPageService>) -> Self {
        Self {
            gateway,
            pages,
            confirmed: Mutex::new(None),
        }
    }

    pub fn confirmed_mode(&self) -> Option<DriverLogConversionMode> {
        *self.confirmed.lock()
    }

    /// Resolve `internal` to a reachable URL. `None` means no log is available;
    /// it is never an error.
    pub async fn resolve(&self, internal: &str) -> Option<Url> {
        let internal = match Url::parse(internal) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = internal, error = %e, "Driver log URL is not a valid URL");
                return None;
            }
        };

        if let Some(mode) = self.confirmed_mode() {
            return convert_log_url(mode, &internal, &self.gateway);
        }

        let mut candidate = DriverLogConversionMode::next(None);
        while let Some(mode) = candidate {
            candidate = DriverLogConversionMode::next(Some(mode));

            let Some(url) = convert_log_url(mode, &internal, &self.gateway) else {
                debug!(%mode, "Conversion mode not applicable");
                continue;
            };

            match self.pages.probe(&url).await {
                Ok(status) if status.as_u16() < 300 => {
                    info!(%mode, url = %url, "Driver log URL confirmed");
                    *self.confirmed.lock() = Some(mode);
                    return Some(url);
                }
                Ok(status) => debug!(%mode, url = %url, %status, "Driver log URL rejected"),
                Err(e) => debug!(%mode, url = %url, error = %e, "Driver log URL unreachable"),
            }
        }

        warn!(url = %internal, "No reachable driver log URL found");
        None
    }
}
