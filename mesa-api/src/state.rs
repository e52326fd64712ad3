use std::sync::Arc;

use mesa_core::clock::Clock;
use mesa_core::store::Store;
use mesa_notify::{AuditRecorder, NotificationBus};
use mesa_pay::{CodiEngine, MercadoPagoEngine, PaymentGateway, ReferencesEngine, SpeiEngine};
use mesa_reserve::{ReservationEngine, TableMapProjector};

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationEngine>,
    pub tables: Arc<TableMapProjector>,
    pub mercadopago: Arc<MercadoPagoEngine>,
    pub codi: Arc<CodiEngine>,
    pub spei: Arc<SpeiEngine>,
    pub references: Arc<ReferencesEngine>,
    pub audit: Arc<AuditRecorder>,
    pub bus: Arc<NotificationBus>,
}

impl AppState {
    /// Wire every engine over one store, one bus, one clock.
    pub fn build(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        mercadopago_webhook_secret: Option<String>,
    ) -> Self {
        let bus = Arc::new(NotificationBus::new(store.clone(), clock.clone()));
        let audit = Arc::new(AuditRecorder::new(store.clone()));
        Self {
            reservations: Arc::new(ReservationEngine::new(
                store.clone(),
                bus.clone(),
                audit.clone(),
                clock.clone(),
            )),
            tables: Arc::new(TableMapProjector::new(store.clone())),
            mercadopago: Arc::new(MercadoPagoEngine::new(
                store.clone(),
                bus.clone(),
                gateway,
                clock.clone(),
                mercadopago_webhook_secret,
            )),
            codi: Arc::new(CodiEngine::new(store.clone(), bus.clone(), clock.clone())),
            spei: Arc::new(SpeiEngine::new(store.clone(), bus.clone(), clock.clone())),
            references: Arc::new(ReferencesEngine::new(
                store,
                bus.clone(),
                audit.clone(),
                clock,
            )),
            audit,
            bus,
        }
    }
}
