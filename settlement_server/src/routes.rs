//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async and bounded by the configured storage
//! timeout, so handlers must only ever `.await` them.
//!
//! The caller's identity comes from the upstream proxy (see [`crate::auth`]). Routes under `/admin` additionally
//! pass through the ACL middleware, which turns away anyone without the admin role.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use serde_json::json;
use settlement_engine::{
    db_types::{OrderId, PayoutMethod, UserId},
    order_objects::{Role, TransitionRequest},
    payment_objects::{PaymentFailed, PaymentFailedOutcome},
    payout_objects::AdvancePayoutRequest,
    PayoutProcessor,
    ReconciliationApi,
    SettlementCoordinator,
    SettlementDatabase,
    SettlementError,
};

use crate::{
    auth::Caller,
    config::ServerOptions,
    data_objects::{
        CheckoutParams,
        CommissionQuery,
        JsonResponse,
        OrderListQuery,
        PaymentConfirmationParams,
        PayoutRequestParams,
        ReconciliationQuery,
        ResolveParams,
        SettlementResponse,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Settlement  ----------------------------------------------------
route!(confirm_payment => Post "/settlement/confirm" impl SettlementDatabase);
/// Route handler for the gateway's payment confirmation webhook.
///
/// The gateway's signature has already been checked by the time the request gets here. Confirmations may be
/// delivered more than once: a repeat returns `200` with `duplicate: true` and the original transaction.
///
/// Transient failures are retried in-process first. If they persist, the server answers `503` so that the gateway
/// delivers the event again. Every other failure is terminal, is answered with a `4xx`, and leaves an entry in the
/// reconciliation queue.
pub async fn confirm_payment<B: SettlementDatabase>(
    body: web::Json<PaymentConfirmationParams>,
    api: web::Data<SettlementCoordinator<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let event = body.into_inner().into_event(&options.currency)?;
    info!("💻️ Payment {} of {} confirmed for order [{}]", event.gateway_reference, event.amount, event.order_id);
    let result = api.settle_with_retry(event, &options.settle_retry).await.map_err(|e| {
        warn!("💻️ Could not settle the payment. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(SettlementResponse::from(result)))
}

route!(payment_failed => Post "/settlement/failed" impl SettlementDatabase);
pub async fn payment_failed<B: SettlementDatabase>(
    body: web::Json<PaymentFailed>,
    api: web::Data<SettlementCoordinator<B>>,
) -> Result<HttpResponse, ServerError> {
    let event = body.into_inner();
    info!("💻️ Payment {} for order [{}] failed", event.gateway_reference, event.order_id);
    let outcome = api.payment_failed(event).await?;
    let message = match &outcome {
        PaymentFailedOutcome::Cancelled(o) => format!("Order {} has been cancelled", o.order_id),
        PaymentFailedOutcome::AlreadyCancelled(o) => format!("Order {} was already cancelled", o.order_id),
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(checkout => Post "/orders" impl SettlementDatabase);
/// Route handler for checkout.
///
/// The buyer submits their intent to purchase a product. The fees, shipping and tax are computed and frozen on the
/// order. Submitting the same checkout twice returns the existing order.
pub async fn checkout<B: SettlementDatabase>(
    caller: Caller,
    body: web::Json<CheckoutParams>,
    api: web::Data<SettlementCoordinator<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner().into_new_order(&options.currency)?;
    if caller.actor().id != order.buyer_id {
        return Err(SettlementError::PermissionDenied("You can only check out on your own behalf".into()).into());
    }
    debug!("💻️ Checkout of product {} by {} for order [{}]", order.product_id, order.buyer_id, order.order_id);
    let order = api.create_order(order).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(my_orders => Get "/orders" impl SettlementDatabase);
/// The caller's orders, newest first.
///
/// `role=buyer` or `role=seller` narrows the list to purchases or sales, and `status` to orders in that state. Results
/// are paged with `limit` and `offset`.
pub async fn my_orders<B: SettlementDatabase>(
    caller: Caller,
    query: web::Query<OrderListQuery>,
    api: web::Data<SettlementCoordinator<B>>,
) -> Result<HttpResponse, ServerError> {
    let user = caller.into_inner().id;
    let filter = query.into_inner().into_filter(user);
    debug!("💻️ GET orders. {filter}");
    let orders = api.search_orders(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(my_order_stats => Get "/orders/stats" impl SettlementDatabase);
/// Counts of the caller's purchases and sales by status, and the value of their sales.
pub async fn my_order_stats<B: SettlementDatabase>(
    caller: Caller,
    api: web::Data<SettlementCoordinator<B>>,
) -> Result<HttpResponse, ServerError> {
    let user = caller.into_inner().id;
    debug!("💻️ GET order stats for {user}");
    let stats = api.order_stats(&user).await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(order_by_id => Get "/orders/{order_id}" impl SettlementDatabase);
/// Only the buyer, the seller or an administrator can see an order.
pub async fn order_by_id<B: SettlementDatabase>(
    caller: Caller,
    path: web::Path<OrderId>,
    api: web::Data<SettlementCoordinator<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let actor = caller.into_inner();
    debug!("💻️ GET order [{order_id}] for {actor}");
    let order = api.fetch_order(&order_id).await?;
    if !actor.is_admin() && !order.is_party(&actor.id) {
        return Err(SettlementError::PermissionDenied(format!("You are not a party to order {order_id}")).into());
    }
    Ok(HttpResponse::Ok().json(order))
}

route!(transition_order => Post "/orders/{order_id}/transition" impl SettlementDatabase);
/// Moves an order to `target_status` on behalf of the caller.
///
/// The state machine decides both whether the move is allowed at all (`409` if not), and whether this caller may
/// make it (`403` if not). Sellers ship, buyers confirm delivery, either party may dispute or cancel, and
/// administrators resolve disputes.
pub async fn transition_order<B: SettlementDatabase>(
    caller: Caller,
    path: web::Path<OrderId>,
    body: web::Json<TransitionRequest>,
    api: web::Data<SettlementCoordinator<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let request = body.into_inner();
    let actor = caller.into_inner();
    debug!("💻️ {actor} asks to move order [{order_id}] to {}", request.target_status);
    let result = api.transition_order(&order_id, &request, &actor).await?;
    Ok(HttpResponse::Ok().json(json!({
        "previous_status": result.previous_status,
        "order": result.order,
    })))
}

//----------------------------------------------   Payouts  ----------------------------------------------------
route!(request_payout => Post "/payouts" impl SettlementDatabase);
/// A seller asks for (part of) their withdrawable balance to be paid out.
pub async fn request_payout<B: SettlementDatabase>(
    caller: Caller,
    body: web::Json<PayoutRequestParams>,
    api: web::Data<PayoutProcessor<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let seller_id = caller.into_inner().id;
    let params = body.into_inner();
    let amount = params.amount(&options.currency)?;
    let method = match params.method {
        Some(m) => m,
        None => default_payout_method(&seller_id, api.as_ref()).await?,
    };
    debug!("💻️ Seller {seller_id} requests a payout of {amount}");
    let payout = api.request_payout(&seller_id, amount, method, params.notes).await?;
    Ok(HttpResponse::Ok().json(payout))
}

async fn default_payout_method<B: SettlementDatabase>(
    seller_id: &UserId,
    api: &PayoutProcessor<B>,
) -> Result<PayoutMethod, ServerError> {
    let stored = api.payout_method(seller_id).await?.ok_or_else(|| {
        SettlementError::ValidationError(
            "No payout method was given and you have not set a default one. Use PUT /payouts/method first.".into(),
        )
    })?;
    Ok(stored.method)
}

route!(my_payouts => Get "/payouts" impl SettlementDatabase);
pub async fn my_payouts<B: SettlementDatabase>(
    caller: Caller,
    api: web::Data<PayoutProcessor<B>>,
) -> Result<HttpResponse, ServerError> {
    let seller_id = caller.into_inner().id;
    debug!("💻️ GET payouts for {seller_id}");
    let payouts = api.payouts_for_seller(&seller_id).await?;
    Ok(HttpResponse::Ok().json(payouts))
}

route!(set_payout_method => Put "/payouts/method" impl SettlementDatabase);
pub async fn set_payout_method<B: SettlementDatabase>(
    caller: Caller,
    body: web::Json<PayoutMethod>,
    api: web::Data<PayoutProcessor<B>>,
) -> Result<HttpResponse, ServerError> {
    let seller_id = caller.into_inner().id;
    let method = body.into_inner();
    debug!("💻️ Seller {seller_id} sets their payout method to {}", method.kind());
    let stored = api.set_payout_method(&seller_id, method).await?;
    Ok(HttpResponse::Ok().json(stored))
}

route!(my_earnings => Get "/earnings" impl SettlementDatabase);
pub async fn my_earnings<B: SettlementDatabase>(
    caller: Caller,
    api: web::Data<PayoutProcessor<B>>,
) -> Result<HttpResponse, ServerError> {
    let seller_id = caller.into_inner().id;
    debug!("💻️ GET earnings for {seller_id}");
    let summary = api.seller_earnings_summary(&seller_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(advance_payout => Post "/admin/payouts/{id}/advance" impl SettlementDatabase where requires [Role::Admin]);
pub async fn advance_payout<B: SettlementDatabase>(
    caller: Caller,
    path: web::Path<i64>,
    body: web::Json<AdvancePayoutRequest>,
    api: web::Data<PayoutProcessor<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let AdvancePayoutRequest { status, notes } = body.into_inner();
    let admin = caller.into_inner();
    info!("💻️ {admin} moves payout #{id} to {status}");
    let payout = api.advance_payout(id, status, &admin, notes).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(open_payouts => Get "/admin/payouts/pending" impl SettlementDatabase where requires [Role::Admin]);
pub async fn open_payouts<B: SettlementDatabase>(api: web::Data<PayoutProcessor<B>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET open payouts");
    let payouts = api.open_payouts().await?;
    Ok(HttpResponse::Ok().json(payouts))
}

route!(reconciliation_entries => Get "/admin/reconciliation" impl SettlementDatabase where requires [Role::Admin]);
/// The settlement events that could not be applied and need a human to look at them.
pub async fn reconciliation_entries<B: SettlementDatabase>(
    query: web::Query<ReconciliationQuery>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET reconciliation entries");
    let entries = api.entries(query.include_resolved).await?;
    Ok(HttpResponse::Ok().json(entries))
}

route!(resolve_reconciliation => Post "/admin/reconciliation/{id}/resolve" impl SettlementDatabase where requires [Role::Admin]);
pub async fn resolve_reconciliation<B: SettlementDatabase>(
    caller: Caller,
    path: web::Path<i64>,
    body: web::Json<ResolveParams>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let entry = api.resolve(id, caller.actor(), &body.resolution).await?;
    Ok(HttpResponse::Ok().json(entry))
}

route!(commission_report => Get "/admin/commission" impl SettlementDatabase where requires [Role::Admin]);
/// The platform's commission over settled orders, optionally restricted to a time window.
pub async fn commission_report<B: SettlementDatabase>(
    query: web::Query<CommissionQuery>,
    api: web::Data<PayoutProcessor<B>>,
) -> Result<HttpResponse, ServerError> {
    let CommissionQuery { since, until } = query.into_inner();
    debug!("💻️ GET commission report from {since:?} to {until:?}");
    let report = api.platform_commission(since, until).await?;
    Ok(HttpResponse::Ok().json(report))
}
