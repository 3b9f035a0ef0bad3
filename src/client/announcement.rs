use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::StatusBackend;

/// Fetch the operator broadcast and log it if there is one.
pub async fn check_announcement(backend: Arc<dyn StatusBackend>) -> Option<String> {
    match backend.announcement().await {
        Ok(text) if !text.trim().is_empty() => {
            info!("Announcement: {}", text);
            Some(text)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to fetch announcement: {}", e);
            None
        }
    }
}
