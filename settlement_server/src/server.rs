use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers, HookFuture},
    PayoutProcessor,
    ReconciliationApi,
    SettlementCoordinator,
    SettlementDatabase,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    payout_worker::start_payout_worker,
    routes::{
        health,
        AdvancePayoutRoute,
        CheckoutRoute,
        CommissionReportRoute,
        ConfirmPaymentRoute,
        MyEarningsRoute,
        MyOrderStatsRoute,
        MyOrdersRoute,
        MyPayoutsRoute,
        OpenPayoutsRoute,
        OrderByIdRoute,
        PaymentFailedRoute,
        ReconciliationEntriesRoute,
        RequestPayoutRoute,
        ResolveReconciliationRoute,
        SetPayoutMethodRoute,
        TransitionOrderRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 128;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    if config.database_url.is_unset() {
        return Err(ServerError::ConfigurationError("MKT_DATABASE_URL must be set".into()));
    }
    let mut db = SqliteDatabase::create_and_migrate(config.database_url.reveal(), config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let payouts = PayoutProcessor::new(db.clone(), config.payouts.clone());
    let worker = start_payout_worker(payouts, config.worker_interval, config.auto_payouts);
    let srv = create_server_instance(config, db.clone(), producers)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    worker.abort();
    if let Err(e) = db.close().await {
        warn!("🗃️ Could not close the database cleanly. {e}");
    }
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let bind_addr = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let coordinator = SettlementCoordinator::new(db.clone(), producers.clone(), config.settlement.clone());
        let payouts = PayoutProcessor::new(db.clone(), config.payouts.clone());
        let reconciliation = ReconciliationApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkt::access_log"))
            .app_data(web::Data::new(coordinator))
            .app_data(web::Data::new(payouts))
            .app_data(web::Data::new(reconciliation))
            .app_data(web::Data::new(ServerOptions::from_config(&config)))
            .service(health)
            .configure(configure_routes::<SqliteDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((bind_addr.0.as_str(), bind_addr.1))?
    .run();
    Ok(srv)
}

/// Registers every settlement, order, payout and admin route for backend `B`.
pub fn configure_routes<B: SettlementDatabase + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(ConfirmPaymentRoute::<B>::new())
        .service(PaymentFailedRoute::<B>::new())
        .service(CheckoutRoute::<B>::new())
        .service(MyOrdersRoute::<B>::new())
        // must come before /orders/{order_id}
        .service(MyOrderStatsRoute::<B>::new())
        .service(OrderByIdRoute::<B>::new())
        .service(TransitionOrderRoute::<B>::new())
        .service(SetPayoutMethodRoute::<B>::new())
        .service(RequestPayoutRoute::<B>::new())
        .service(MyPayoutsRoute::<B>::new())
        .service(MyEarningsRoute::<B>::new())
        .service(OpenPayoutsRoute::<B>::new())
        .service(AdvancePayoutRoute::<B>::new())
        .service(ReconciliationEntriesRoute::<B>::new())
        .service(ResolveReconciliationRoute::<B>::new())
        .service(CommissionReportRoute::<B>::new());
}

/// Notification delivery, search indexing and the admin console are separate services. Until they subscribe, the
/// server records the events it would hand to them.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_event(|ev| {
            let [buyer, seller] = ev.recipients();
            info!("📬️ {} for order [{}]. Notify {buyer} and {seller}", ev.name(), ev.order().order_id);
            Box::pin(async { Ok(()) }) as HookFuture
        })
        .on_reservation_changed(|ev| {
            let state = if ev.reserved { "sold" } else { "available again" };
            info!("📬️ Product {} is {state} (order [{}])", ev.product_id, ev.order_id);
            Box::pin(async { Ok(()) }) as HookFuture
        })
        .on_admin_escalation(|ev| {
            warn!("📬️ Admin attention needed for order [{}]: {}", ev.order_id, ev.reason);
            Box::pin(async { Ok(()) }) as HookFuture
        });
    hooks
}
