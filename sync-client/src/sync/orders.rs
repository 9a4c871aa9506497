//! Typed order operations on top of [`Query`] and [`Mutation`]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared::message::{
    CheckOrderStatusPayload, EventType, NewOrderAck, NewOrderPayload, OrderLookup, QueryPayload,
    StatusUpdateAck, UpdateOrderStatusPayload,
};
use shared::order::{OrderId, OrderSnapshot, OrderStatus};

use super::{Mutation, Query, QueryHandle, QueryOptions, RequestKey, Requester};
use crate::config::RetryPolicy;
use crate::error::SyncError;
use crate::message::MessageClient;

/// Order hub operations for POS, kitchen and customer screens
#[derive(Clone)]
pub struct OrderSync {
    requester: Arc<dyn Requester>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OrderSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSync").field("retry", &self.retry).finish_non_exhaustive()
    }
}

impl OrderSync {
    pub fn new(client: MessageClient) -> Self {
        let retry = client.config().retry;
        Self {
            requester: Arc::new(client),
            retry,
        }
    }

    pub fn with_requester(requester: Arc<dyn Requester>, retry: RetryPolicy) -> Self {
        Self { requester, retry }
    }

    fn mutation<P, T>(&self, event: EventType) -> Mutation<P, T>
    where
        P: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        Mutation::new(self.requester.clone(), event).with_retry(self.retry)
    }

    /// Submit a new order; resolves to the id the hub stored it under
    pub async fn new_order(&self, order: &NewOrderPayload) -> Result<NewOrderAck, SyncError> {
        self.mutation(EventType::NewOrder).mutate(order).await
    }

    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        note: Option<String>,
    ) -> Result<StatusUpdateAck, SyncError> {
        let payload = UpdateOrderStatusPayload {
            order_id,
            status,
            note,
        };
        self.mutation(EventType::UpdateOrderStatus).mutate(&payload).await
    }

    /// `None` when the hub no longer holds the order
    pub async fn check_order_status(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderSnapshot>, SyncError> {
        let lookup: OrderLookup = self
            .mutation(EventType::CheckOrderStatus)
            .mutate(&CheckOrderStatusPayload { order_id })
            .await?;
        Ok(lookup.into_order())
    }

    /// Poll one order's status
    pub fn watch_order(
        &self,
        order_id: OrderId,
        interval: Duration,
    ) -> Result<QueryHandle<OrderLookup>, SyncError> {
        let key = RequestKey::new(EventType::CheckOrderStatus, &CheckOrderStatusPayload { order_id })?;
        Ok(Query::new(self.requester.clone(), key)
            .with_retry(self.retry)
            .with_options(QueryOptions::new().refetch_interval(interval))
            .start())
    }

    /// Catalog / settings read answered by the persistence layer
    pub fn catalog(
        &self,
        resource: impl Into<String>,
        params: Option<Value>,
        options: QueryOptions<Value>,
    ) -> Result<QueryHandle<Value>, SyncError> {
        let key = RequestKey::new(
            EventType::Query,
            &QueryPayload {
                resource: resource.into(),
                params,
            },
        )?;
        Ok(Query::new(self.requester.clone(), key)
            .with_retry(self.retry)
            .with_options(options)
            .start())
    }
}
