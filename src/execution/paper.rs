use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::execution::router::{
    MarketPosition, OrderKind, OrderRequest, OrderRole, OrderRouter, VenueEvent,
};
use crate::models::Direction;

/// An exit order resting in the paper book until price reaches it
#[derive(Debug, Clone)]
struct RestingOrder {
    id: Uuid,
    role: OrderRole,
    level: f64,
    quantity: u32,
}

/// Simulated exit book for one bracketed position
///
/// Entries fill instantly at their reference price, so only stops and
/// targets rest here. `on_price` is the sole fill driver; the stop is
/// always evaluated before the targets so a tick that crosses both sides
/// resolves in favor of the loss cut.
#[derive(Debug, Default)]
pub struct PaperBook {
    direction: Option<Direction>,
    position_quantity: u32,
    stop: Option<RestingOrder>,
    targets: Vec<RestingOrder>,
}

impl PaperBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_quantity(&self) -> u32 {
        self.position_quantity
    }

    pub fn is_flat(&self) -> bool {
        self.position_quantity == 0
    }

    fn open(&mut self, direction: Direction, quantity: u32) {
        self.direction = Some(direction);
        self.position_quantity = quantity;
        self.stop = None;
        self.targets.clear();
    }

    fn rest(&mut self, order: &OrderRequest) -> Result<()> {
        let level = match order.kind {
            OrderKind::Limit(p) | OrderKind::StopMarket(p) => p,
            OrderKind::Market => bail!("market orders do not rest in the book"),
        };
        let resting = RestingOrder {
            id: order.id,
            role: order.role,
            level,
            quantity: order.quantity,
        };
        match order.role {
            OrderRole::Stop => self.stop = Some(resting),
            OrderRole::Target1 | OrderRole::Target2 => self.targets.push(resting),
            OrderRole::Entry => bail!("entry orders do not rest in the book"),
        }
        Ok(())
    }

    /// Advance the book by one observed price, returning any fills and the
    /// flat notification once the position is fully closed
    pub fn on_price(&mut self, price: f64) -> Vec<VenueEvent> {
        let direction = match self.direction {
            Some(d) if self.position_quantity > 0 => d,
            _ => return Vec::new(),
        };
        let mut events = Vec::new();

        let stop_hit = self.stop.as_ref().is_some_and(|s| match direction {
            Direction::Long => price <= s.level,
            Direction::Short => price >= s.level,
        });
        if stop_hit {
            let stop = self.stop.take().unwrap();
            events.push(VenueEvent::OrderFilled {
                order_id: stop.id,
                role: OrderRole::Stop,
                price,
                quantity: self.position_quantity,
            });
            events.push(self.close());
            return events;
        }

        // Targets fill at their limit level, nearest first by submission order
        while let Some(target) = self.targets.first().cloned() {
            let reached = match direction {
                Direction::Long => price >= target.level,
                Direction::Short => price <= target.level,
            };
            if !reached {
                break;
            }
            self.targets.remove(0);
            let filled = target.quantity.min(self.position_quantity);
            self.position_quantity -= filled;
            events.push(VenueEvent::OrderFilled {
                order_id: target.id,
                role: target.role,
                price: target.level,
                quantity: filled,
            });
            if let Some(stop) = self.stop.as_mut() {
                stop.quantity = self.position_quantity;
            }
        }

        if self.targets.is_empty() && !events.is_empty() {
            if let Some(stop) = self.stop.take() {
                debug!(order_id = %stop.id, "Cancelling stop, all targets filled");
            }
            events.push(self.close());
        }

        events
    }

    fn close(&mut self) -> VenueEvent {
        self.direction = None;
        self.position_quantity = 0;
        self.stop = None;
        self.targets.clear();
        VenueEvent::PositionUpdate {
            position: MarketPosition::Flat,
            quantity: 0,
            average_price: 0.0,
        }
    }
}

/// In-process venue backed by a shared `PaperBook`
///
/// Entry orders fill immediately at the request's reference price and the
/// fill event goes straight onto the channel; exit orders rest until the
/// live feed walks the book over them.
pub struct PaperVenue {
    book: Arc<Mutex<PaperBook>>,
    events: UnboundedSender<VenueEvent>,
}

impl PaperVenue {
    pub fn new(book: Arc<Mutex<PaperBook>>, events: UnboundedSender<VenueEvent>) -> Self {
        Self { book, events }
    }
}

impl OrderRouter for PaperVenue {
    fn place(&mut self, order: &OrderRequest) -> Result<()> {
        let mut book = self.book.lock().unwrap();
        match order.role {
            OrderRole::Entry => {
                book.open(order.direction, order.quantity);
                let fill_price = match order.kind {
                    OrderKind::Limit(p) => p,
                    _ => order.reference_price,
                };
                self.events.send(VenueEvent::OrderFilled {
                    order_id: order.id,
                    role: OrderRole::Entry,
                    price: fill_price,
                    quantity: order.quantity,
                })?;
            }
            _ => book.rest(order)?,
        }
        Ok(())
    }
}
