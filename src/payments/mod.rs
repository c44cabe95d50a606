mod mercadopago;
mod reconcile;

pub use mercadopago::*;
pub use reconcile::*;
