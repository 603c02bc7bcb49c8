use crate::{
    db::DbPool,
    entities::setting::{self, Entity as SettingEntity},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Setting key holding the staff address for new-reservation alerts.
pub const STAFF_EMAIL_SETTING: &str = "email";

/// Read access to the key/value settings table.
#[derive(Clone)]
pub struct SettingsService {
    db_pool: Arc<DbPool>,
    fallback_staff_email: String,
}

impl SettingsService {
    /// `fallback_staff_email` is the configured address used when no setting is stored.
    pub fn new(db_pool: Arc<DbPool>, fallback_staff_email: impl Into<String>) -> Self {
        Self {
            db_pool,
            fallback_staff_email: fallback_staff_email.into(),
        }
    }

    /// Value stored under `key`, if any.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let row = SettingEntity::find()
            .filter(setting::Column::Key.eq(key))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, key, "Failed to read setting");
                ServiceError::DatabaseError(e)
            })?;

        debug!(key, found = row.is_some(), "Setting lookup");
        Ok(row.map(|s| s.value))
    }

    /// The configured staff address.
    pub fn fallback_staff_email(&self) -> &str {
        &self.fallback_staff_email
    }

    /// Staff recipient: the `email` setting when present and non-blank, else the configured address.
    #[instrument(skip(self))]
    pub async fn staff_notification_email(&self) -> Result<String, ServiceError> {
        let stored = self.get(STAFF_EMAIL_SETTING).await?;
        Ok(resolve_staff_email(stored, &self.fallback_staff_email))
    }
}

fn resolve_staff_email(stored: Option<String>, fallback: &str) -> String {
    stored
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_address_wins_over_fallback() {
        assert_eq!(
            resolve_staff_email(Some(" desk@shop.test ".into()), "ops@shop.test"),
            "desk@shop.test"
        );
    }

    #[test]
    fn blank_or_missing_setting_uses_fallback() {
        assert_eq!(resolve_staff_email(None, "ops@shop.test"), "ops@shop.test");
        assert_eq!(
            resolve_staff_email(Some("   ".into()), "ops@shop.test"),
            "ops@shop.test"
        );
    }
}
