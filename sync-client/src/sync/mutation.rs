//! One-shot write with retry
//!
//! Nothing is sent on construction; each [`Mutation::mutate`] call runs the
//! retry loop once.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::message::EventType;
use tokio_util::sync::CancellationToken;

use super::{RequestKey, Requester, execute};
use crate::config::RetryPolicy;
use crate::error::SyncError;

pub struct Mutation<P, T> {
    requester: Arc<dyn Requester>,
    event: EventType,
    retry: RetryPolicy,
    cancel: CancellationToken,
    _marker: PhantomData<fn(&P) -> T>,
}

impl<P, T> Mutation<P, T>
where
    P: Serialize,
    T: DeserializeOwned,
{
    pub fn new(requester: Arc<dyn Requester>, event: EventType) -> Self {
        Self {
            requester,
            event,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn event(&self) -> EventType {
        self.event
    }

    /// Send `payload` and decode the response `data`
    pub async fn mutate(&self, payload: &P) -> Result<T, SyncError> {
        let key = RequestKey::new(self.event, payload)?;
        let response = execute(self.requester.as_ref(), &key, &self.retry, &self.cancel).await?;
        Ok(response.parse_data()?)
    }

    /// Abort any in-flight `mutate`; later calls fail with `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<P, T> Drop for Mutation<P, T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::*;
    use serde_json::json;
    use shared::message::{StatusUpdateAck, UpdateOrderStatusPayload};
    use shared::order::OrderStatus;
    use std::time::Duration;

    fn update(order_id: i64) -> UpdateOrderStatusPayload {
        UpdateOrderStatusPayload {
            order_id,
            status: OrderStatus::Preparing,
            note: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_sends_nothing() {
        let fake = Arc::new(FakeRequester::always(ok(json!({}))));
        let mutation: Mutation<UpdateOrderStatusPayload, serde_json::Value> =
            Mutation::new(fake.clone(), EventType::UpdateOrderStatus);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fake.calls(), 0);
        drop(mutation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_decodes_ack() {
        let fake = Arc::new(FakeRequester::new(
            vec![unreachable()],
            ok(json!({
                "orderId": 12,
                "status": "preparing",
                "previousStatus": "pending",
                "changed": true
            })),
        ));
        let mutation = Mutation::<_, StatusUpdateAck>::new(fake.clone(), EventType::UpdateOrderStatus);

        let ack = mutation.mutate(&update(12)).await.unwrap();
        assert_eq!(ack.order_id, 12);
        assert_eq!(ack.previous_status, OrderStatus::Pending);
        assert!(ack.changed);
        assert_eq!(fake.calls(), 2);

        let sent: UpdateOrderStatusPayload = fake.seen()[0].parse_payload().unwrap();
        assert_eq!(sent, update(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_data_is_decode_error() {
        let fake = Arc::new(FakeRequester::always(ok(json!("not an ack"))));
        let mutation = Mutation::<_, StatusUpdateAck>::new(fake, EventType::UpdateOrderStatus);

        let err = mutation.mutate(&update(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_mutation_sends_nothing() {
        let fake = Arc::new(FakeRequester::always(ok(json!({}))));
        let mutation =
            Mutation::<_, serde_json::Value>::new(fake.clone(), EventType::UpdateOrderStatus)
                .with_retry(RetryPolicy::none());

        mutation.cancel();
        assert!(mutation.is_cancelled());
        assert_eq!(mutation.mutate(&update(1)).await.unwrap_err(), SyncError::Cancelled);
        assert_eq!(fake.calls(), 0);
    }
}
