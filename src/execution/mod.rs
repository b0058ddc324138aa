// Order routing and position lifecycle
pub mod controller;
pub mod paper;
pub mod router;

pub use controller::{bracket_orders, Phase, PositionController};
pub use paper::{PaperBook, PaperVenue};
pub use router::{MarketPosition, OrderKind, OrderRequest, OrderRole, OrderRouter, VenueEvent};
