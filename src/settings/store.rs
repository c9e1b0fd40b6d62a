//! In-memory settings store.

use super::{Catalogs, DefaultsUpdate, GuildDefaults, SettingsStore};
use crate::error::BotError;
use crate::types::GuildId;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

/// Settings held in process memory, seeded from configuration
pub struct InMemorySettings {
    fallback: GuildDefaults,
    guilds: RwLock<HashMap<GuildId, GuildDefaults>>,
    catalogs: RwLock<Catalogs>,
}

impl InMemorySettings {
    pub fn new(fallback: GuildDefaults, catalogs: Catalogs) -> Self {
        Self {
            fallback,
            guilds: RwLock::new(HashMap::new()),
            catalogs: RwLock::new(catalogs),
        }
    }

    /// Replace the catalogs, e.g. after the backend reports new models.
    pub fn replace_catalogs(&self, catalogs: Catalogs) {
        *self.catalogs.write() = catalogs;
    }
}

impl SettingsStore for InMemorySettings {
    fn defaults(&self, guild: Option<GuildId>) -> GuildDefaults {
        guild
            .and_then(|id| self.guilds.read().get(&id).cloned())
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn catalogs(&self) -> Catalogs {
        self.catalogs.read().clone()
    }

    fn update_defaults(
        &self,
        guild: GuildId,
        update: &DefaultsUpdate,
    ) -> Result<Vec<String>, BotError> {
        let catalogs = self.catalogs();
        let mut guilds = self.guilds.write();
        let mut defaults = guilds
            .get(&guild)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        let report = update.apply(&mut defaults, &catalogs)?;
        guilds.insert(guild, defaults);
        info!(guild_id = %guild, changes = report.len(), "Updated guild defaults");
        Ok(report)
    }
}
