//! Payment reconciliation across three Mexican rails: MercadoPago checkout
//! preferences, CoDi QR charges, and SPEI bank-transfer references, plus the
//! manual reconciliation queue over bank references.

pub mod codi;
pub mod gateway;
pub mod mercadopago;
pub mod references;
pub mod settlement;
pub mod spei;

pub use codi::CodiEngine;
pub use gateway::{HttpMercadoPagoGateway, PaymentGateway, UnconfiguredGateway};
pub use mercadopago::MercadoPagoEngine;
pub use references::ReferencesEngine;
pub use spei::SpeiEngine;
