#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ride_dispatch::config::DispatchSettings;
use ride_dispatch::models::driver::{DriverId, GeoPoint};
use ride_dispatch::models::events::{ClientEvent, DriverOnlinePayload, ServerEvent};
use ride_dispatch::models::identity::Identity;
use ride_dispatch::models::order::{
    CustomerId, CustomerSummary, Order, OrderActivity, OrderId, OrderStatus,
};
use ride_dispatch::router::ConnectionGuard;
use ride_dispatch::router::auth::StaticTokenAuthenticator;
use ride_dispatch::session;
use ride_dispatch::state::AppState;
use ride_dispatch::storage::{InMemoryOrderStore, OrderStore, StorageError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

pub const SERVICE: u64 = 1;
pub const CUSTOMER: u64 = 3;

pub fn settings(radius_km: f64) -> DispatchSettings {
    DispatchSettings {
        radius_km,
        offer_timeout: Duration::from_secs(15),
        resolution_buffer_size: 64,
    }
}

pub fn state_with_store(settings: DispatchSettings, store: Arc<dyn OrderStore>) -> AppState {
    AppState::new(
        settings,
        store,
        Arc::new(StaticTokenAuthenticator::new(HashMap::new())),
    )
}

pub fn state(radius_km: f64) -> (AppState, Arc<InMemoryOrderStore>) {
    let store = Arc::new(InMemoryOrderStore::new());
    (state_with_store(settings(radius_km), store.clone()), store)
}

pub fn order(id: OrderId, pickup: GeoPoint) -> Order {
    Order {
        id,
        customer_id: CUSTOMER,
        driver_id: None,
        service_id: SERVICE,
        service_name: "standard".to_string(),
        status: OrderStatus::Requested,
        pickup,
        dropoff: GeoPoint::new(pickup.lat + 0.05, pickup.lng),
        estimated_fare: 12.5,
        distance_km: 5.5,
        scheduled_at: None,
        cancel_reason_id: None,
        created_at: Utc::now(),
        accepted_at: None,
        arrived_at: None,
        started_at: None,
        finished_at: None,
        canceled_at: None,
    }
}

pub async fn insert_order(state: &AppState, id: OrderId, pickup: GeoPoint) -> Order {
    let order = order(id, pickup);
    state.store.insert_order(order.clone()).await.unwrap();
    order
}

/// A registered connection plus the events pushed to it.
pub struct Client {
    pub identity: Identity,
    pub guard: ConnectionGuard,
    pub events: UnboundedReceiver<ServerEvent>,
}

impl Client {
    pub async fn send(&self, state: &AppState, event: ClientEvent) {
        session::handle_event(state, self.guard.id(), self.identity, event)
            .await
            .unwrap();
    }

    pub async fn send_text(&self, state: &AppState, frame: serde_json::Value) {
        session::handle_text(state, self.guard.id(), self.identity, &frame.to_string()).await;
    }

    /// Waits for the next event called `name`, skipping others.
    pub async fn expect(&mut self, name: &str) -> serde_json::Value {
        let wait = async {
            loop {
                let event = self.events.recv().await.expect("connection closed");
                if event.name() == name {
                    return serde_json::to_value(&event).unwrap();
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(120), wait)
            .await
            .unwrap_or_else(|_| panic!("no {name} event arrived"))
    }

    /// Names of everything queued right now.
    pub fn drain(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => names.push(event.name()),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return names,
            }
        }
    }
}

pub fn connect(state: &AppState, identity: Identity) -> Client {
    let (guard, events) = state.router.register(identity);
    session::on_connect(state, guard.id(), identity);
    Client {
        identity,
        guard,
        events,
    }
}

pub async fn online_driver(state: &AppState, driver_id: DriverId, location: GeoPoint) -> Client {
    let client = connect(state, Identity::driver(driver_id));
    client
        .send(
            state,
            ClientEvent::DriverOnline(DriverOnlinePayload {
                capabilities: HashSet::from([SERVICE]),
                location: Some(location),
            }),
        )
        .await;
    client
}

/// Wraps the in-memory store and fails commits while `failing` is set.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryOrderStore,
    pub failing: AtomicBool,
}

#[async_trait]
impl OrderStore for FlakyStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Order, StorageError> {
        self.inner.get_order(order_id).await
    }

    async fn insert_order(&self, order: Order) -> Result<(), StorageError> {
        self.inner.insert_order(order).await
    }

    async fn commit_transition(
        &self,
        expected: OrderStatus,
        order: Order,
        activity: OrderActivity,
    ) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk full".to_string()));
        }
        self.inner.commit_transition(expected, order, activity).await
    }

    async fn activities(&self, order_id: OrderId) -> Result<Vec<OrderActivity>, StorageError> {
        self.inner.activities(order_id).await
    }

    async fn customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSummary>, StorageError> {
        self.inner.customer(customer_id).await
    }

    async fn active_order_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<Order>, StorageError> {
        self.inner.active_order_for_driver(driver_id).await
    }
}
