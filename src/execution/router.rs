use uuid::Uuid;

use crate::models::Direction;

/// Which leg of the bracket an order belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Entry,
    Stop,
    Target1,
    Target2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Limit(f64),
    StopMarket(f64),
}

/// One order instruction handed to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub id: Uuid,
    pub role: OrderRole,
    /// Direction of the position this order serves; exit orders trade the
    /// opposite side
    pub direction: Direction,
    pub quantity: u32,
    pub kind: OrderKind,
    /// Signal-time reference price; paper venues fill market orders here
    pub reference_price: f64,
}

/// Callbacks delivered by the venue/platform
///
/// These and the poll timer are the only triggers for controller state
/// transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    OrderFilled {
        order_id: Uuid,
        role: OrderRole,
        price: f64,
        quantity: u32,
    },
    OrderRejected {
        order_id: Uuid,
        role: OrderRole,
        reason: String,
    },
    PositionUpdate {
        position: MarketPosition,
        quantity: u32,
        average_price: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPosition {
    Flat,
    Long,
    Short,
}

/// Seam to the execution venue
///
/// Submission must return or fail within bounded time; fills, rejections and
/// position changes come back asynchronously as `VenueEvent`s.
pub trait OrderRouter: Send {
    fn place(&mut self, order: &OrderRequest) -> anyhow::Result<()>;
}
