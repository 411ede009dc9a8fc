use std::sync::Arc;

use beacon_presence::PresenceTracker;
use beacon_push::target::PushTargetStore;

use crate::ingress::EventIngress;
use crate::qrlogin::QrLogin;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub ingress: EventIngress,
    pub presence: Arc<PresenceTracker>,
    pub targets: PushTargetStore,
    pub qr: QrLogin,
    pub jwt_secret: String,
}
