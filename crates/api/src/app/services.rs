//! Service wiring shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use mercora_catalog::CatalogService;
use mercora_customers::CustomerService;
use mercora_notify::{LogNotifier, Notifier};
use mercora_orders::OrderService;

pub struct AppServices {
    pub customers: CustomerService,
    pub catalog: CatalogService,
    pub orders: OrderService,
}

pub fn build_services(pool: PgPool) -> AppServices {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let customers = CustomerService::new(pool);
    AppServices {
        orders: OrderService::new(customers.clone(), notifier),
        catalog: CatalogService::new(),
        customers,
    }
}
