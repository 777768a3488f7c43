use crate::{
    commission::CommissionBreakdown,
    db_types::{NewOrder, Order, OrderId, OrderStatusType, ProductId, UserId},
    order_objects::{OrderQueryFilter, OrderStats, OrderStatusUpdate},
    traits::{InsertOrderResult, StorageError},
};

/// Persistence for orders. Only the [`crate::OrderLedger`] should call the mutating methods.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores a new `pending` order with the amounts from `breakdown`.
    ///
    /// This call is idempotent on `order_id`: if the order already exists, it is returned as
    /// [`InsertOrderResult::AlreadyExists`] and nothing is written.
    async fn insert_order(
        &self,
        order: &NewOrder,
        breakdown: &CommissionBreakdown,
    ) -> Result<InsertOrderResult, StorageError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError>;

    /// Fetches orders matching the filter, newest first, honouring the filter's `limit` and `offset`.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, StorageError>;

    /// Counts the user's purchases and sales by status.
    async fn order_stats(&self, user_id: &UserId) -> Result<OrderStats, StorageError>;

    /// Compare-and-swap status update.
    ///
    /// The update is applied only if the order's status is still `expected`. Returns the updated order, or `None` if
    /// the order is missing or its status has moved on.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        update: &OrderStatusUpdate,
    ) -> Result<Option<Order>, StorageError>;

    /// Returns the order that bought the product, if it has been sold.
    async fn fetch_product_sale(&self, product_id: &ProductId) -> Result<Option<OrderId>, StorageError>;

    /// Makes the product sold by this order available again. Returns the released product, if there was one.
    async fn release_product(&self, order_id: &OrderId) -> Result<Option<ProductId>, StorageError>;
}
