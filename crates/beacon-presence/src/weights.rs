use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use beacon_db::Database;
use beacon_types::models::DeviceFlag;

use crate::PresenceError;

/// In-memory copy of the `device_flags` weight table.
#[derive(Debug, Default)]
pub struct DeviceWeights {
    weights: RwLock<HashMap<DeviceFlag, i64>>,
}

impl DeviceWeights {
    pub fn load(db: &Database) -> Result<Self, PresenceError> {
        let weights = Self::default();
        weights.refresh(db)?;
        Ok(weights)
    }

    /// Re-reads the table. Call after editing weights at runtime.
    pub fn refresh(&self, db: &Database) -> Result<(), PresenceError> {
        let rows = db.device_weights().map_err(PresenceError::Storage)?;
        let fresh: HashMap<DeviceFlag, i64> = rows.into_iter().map(|r| (DeviceFlag(r.device_flag), r.weight)).collect();
        info!(flags = fresh.len(), "Loaded device weights");
        *self.weights.write().map_err(|_| PresenceError::Poisoned)? = fresh;
        Ok(())
    }

    pub fn weight(&self, flag: DeviceFlag) -> i64 {
        self.weights
            .read()
            .ok()
            .and_then(|w| w.get(&flag).copied())
            .unwrap_or(0)
    }

    /// The highest-weight flag; ties go to the lower flag. `APP` when empty.
    pub fn primary(&self) -> DeviceFlag {
        let Ok(weights) = self.weights.read() else {
            return DeviceFlag::APP;
        };
        weights
            .iter()
            .max_by(|(fa, wa), (fb, wb)| wa.cmp(wb).then(fb.cmp(fa)))
            .map(|(flag, _)| *flag)
            .unwrap_or(DeviceFlag::APP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_weights_make_app_primary() {
        let db = Database::open_in_memory(1).unwrap();
        let w = DeviceWeights::load(&db).unwrap();
        assert_eq!(w.primary(), DeviceFlag::APP);
        assert!(w.weight(DeviceFlag::PC) > w.weight(DeviceFlag::WEB));
        assert_eq!(w.weight(DeviceFlag(9)), 0);
    }

    #[test]
    fn refresh_picks_up_changes() {
        let db = Database::open_in_memory(1).unwrap();
        let w = DeviceWeights::load(&db).unwrap();
        db.set_device_weight(2, 100, "pc").unwrap();
        assert_eq!(w.primary(), DeviceFlag::APP);

        w.refresh(&db).unwrap();
        assert_eq!(w.primary(), DeviceFlag::PC);
        assert_eq!(w.weight(DeviceFlag::PC), 100);
    }
}
