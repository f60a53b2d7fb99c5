//! # ll-storage-local
//! leafline/crates/ll-plugins/ll-storage-local/src/lib.rs
//! Local filesystem implementation of `SubmissionStore`. Stands in for the
//! remote object store during development; the key scheme is the same one
//! the production store uses, so URLs stay stable across backends.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use ll_core::error::{AppError, Result};
use ll_core::traits::SubmissionStore;

pub struct LocalSubmissionStore {
    /// Root directory for all submissions (e.g., "./data/submissions")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/submissions")
    url_prefix: String,
}

impl LocalSubmissionStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix,
        }
    }

    /// `submissions/{order_id}/{item_id}/slot-{n}/{field}_{filename}`
    fn object_key(order_id: &str, item_id: Uuid, slot: u32, field: &str, filename: &str) -> String {
        format!(
            "submissions/{}/{}/slot-{}/{}_{}",
            sanitize(order_id),
            item_id,
            slot,
            sanitize(field),
            sanitize(filename)
        )
    }
}

/// Keeps keys path-safe: anything outside [A-Za-z0-9._-] becomes '_'.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SubmissionStore for LocalSubmissionStore {
    async fn store(
        &self,
        order_id: &str,
        item_id: Uuid,
        slot: u32,
        field: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        if data.is_empty() {
            return Err(AppError::Validation("empty upload".into()));
        }

        let key = Self::object_key(order_id, item_id, slot, field, filename);
        let target = self.root_path.join(&key);
        let parent = target
            .parent()
            .ok_or_else(|| AppError::Store(format!("bad submission key: {key}")))?;

        fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Store(format!("creating {}: {e}", parent.display())))?;
        fs::write(&target, &data)
            .await
            .map_err(|e| AppError::Store(format!("writing {}: {e}", target.display())))?;

        Ok(format!("{}/{}", self.url_prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_under_the_canonical_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSubmissionStore::new(dir.path().to_path_buf(), "/static".into());
        let item_id = Uuid::new_v4();

        let url = store
            .store("pi_123", item_id, 2, "logo", "brand logo.png", b"png".to_vec())
            .await
            .unwrap();

        let expected_key = format!("submissions/pi_123/{item_id}/slot-2/logo_brand_logo.png");
        assert_eq!(url, format!("/static/{expected_key}"));
        assert_eq!(std::fs::read(dir.path().join(expected_key)).unwrap(), b"png");
    }

    #[tokio::test]
    async fn rejects_empty_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSubmissionStore::new(dir.path().to_path_buf(), "/static".into());
        let err = store
            .store("pi_123", Uuid::new_v4(), 1, "logo", "a.png", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
    }
}
