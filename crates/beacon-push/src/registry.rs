use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use beacon_db::cache::FastCache;
use beacon_types::models::DeviceType;

use crate::PushError;
use crate::providers::Pusher;
use crate::providers::apns::{ApnsConfig, ApnsPusher};
use crate::providers::fcm::{FcmConfig, FcmPusher};
use crate::providers::hms::{HmsConfig, HmsPusher};
use crate::providers::mi::{MiConfig, MiPusher};
use crate::providers::oppo::{OppoConfig, OppoPusher};
use crate::providers::vivo::{VivoConfig, VivoPusher};

/// Provider credentials. A provider left as `None` is not registered.
#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    pub apns: Option<ApnsConfig>,
    pub fcm: Option<FcmConfig>,
    pub hms: Option<HmsConfig>,
    pub mi: Option<MiConfig>,
    pub oppo: Option<OppoConfig>,
    pub vivo: Option<VivoConfig>,
}

/// Pushers keyed by `(device type, app bundle id)`.
#[derive(Default, Clone)]
pub struct PusherRegistry {
    pushers: HashMap<(DeviceType, String), Arc<dyn Pusher>>,
}

impl PusherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PushConfig, cache: Arc<dyn FastCache>) -> Result<Self, PushError> {
        let mut registry = Self::new();
        if let Some(c) = &config.apns {
            registry.register(DeviceType::Ios, &c.topic, Arc::new(ApnsPusher::new(c.clone())?));
        }
        if let Some(c) = &config.fcm {
            registry.register(
                DeviceType::Firebase,
                &c.package_name,
                Arc::new(FcmPusher::new(c.clone(), cache.clone())?),
            );
        }
        if let Some(c) = &config.hms {
            registry.register(
                DeviceType::Hms,
                &c.package_name,
                Arc::new(HmsPusher::new(c.clone(), cache.clone())?),
            );
        }
        if let Some(c) = &config.mi {
            registry.register(DeviceType::Mi, &c.package_name, Arc::new(MiPusher::new(c.clone())?));
        }
        if let Some(c) = &config.oppo {
            registry.register(
                DeviceType::Oppo,
                &c.package_name,
                Arc::new(OppoPusher::new(c.clone(), cache.clone())?),
            );
        }
        if let Some(c) = &config.vivo {
            registry.register(
                DeviceType::Vivo,
                &c.package_name,
                Arc::new(VivoPusher::new(c.clone(), cache)?),
            );
        }
        Ok(registry)
    }

    pub fn register(&mut self, device_type: DeviceType, bundle_id: &str, pusher: Arc<dyn Pusher>) {
        info!(device_type = %device_type, bundle_id, provider = pusher.name(), "Registered pusher");
        self.pushers.insert((device_type, bundle_id.to_string()), pusher);
    }

    /// Looks up by the raw strings stored with a push target.
    pub fn get(&self, device_type: &str, bundle_id: &str) -> Result<Arc<dyn Pusher>, PushError> {
        let unsupported = || PushError::UnsupportedDevice {
            device_type: device_type.to_string(),
            bundle_id: bundle_id.to_string(),
        };
        let device_type: DeviceType = device_type.parse().map_err(|_| unsupported())?;
        self.pushers
            .get(&(device_type, bundle_id.to_string()))
            .cloned()
            .ok_or_else(unsupported)
    }

    pub fn len(&self) -> usize {
        self.pushers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pushers.is_empty()
    }
}
