use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, EntryMode};
use crate::execution::router::{
    MarketPosition, OrderKind, OrderRequest, OrderRole, OrderRouter, VenueEvent,
};
use crate::models::{Direction, ExitPlan, Signal, TradeLogEntry};
use crate::persistence::TradeLogWriter;
use crate::signal::{parse, DedupLedger};

/// Position lifecycle phase
///
/// `Flat -> EntryPending -> Filled -> Exiting -> Flat`. Transitions happen
/// only on an accepted signal or a venue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Flat,
    EntryPending,
    Filled,
    Exiting,
}

/// The state machine converting accepted signals into bracketed orders
///
/// Sole owner and mutator of position state and the dedup ledger. Every
/// failure path logs and continues; nothing here terminates the process.
pub struct PositionController {
    config: AppConfig,
    router: Box<dyn OrderRouter>,
    ledger: DedupLedger,
    trade_log: TradeLogWriter,
    phase: Phase,
    active_signal: Option<Signal>,
    actual_entry_price: Option<f64>,
    partial_exit_taken: bool,
}

impl PositionController {
    pub fn new(config: AppConfig, router: Box<dyn OrderRouter>, trade_log: TradeLogWriter) -> Self {
        Self {
            config,
            router,
            ledger: DedupLedger::new(),
            trade_log,
            phase: Phase::Flat,
            active_signal: None,
            actual_entry_price: None,
            partial_exit_taken: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_signal(&self) -> Option<&Signal> {
        self.active_signal.as_ref()
    }

    pub fn actual_entry_price(&self) -> Option<f64> {
        self.actual_entry_price
    }

    pub fn partial_exit_taken(&self) -> bool {
        self.partial_exit_taken
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Handle one raw line from the signal file
    ///
    /// Malformed lines are dropped atomically: logged, no order submission,
    /// no ledger mutation.
    pub fn on_signal_line(&mut self, line: &str) {
        match parse(line, self.config.schema) {
            Ok(signal) => self.on_signal(signal),
            Err(e) => warn!(line, "Dropping malformed signal line: {}", e),
        }
    }

    /// Handle a parsed signal: gate on phase and novelty, then submit the
    /// entry order
    pub fn on_signal(&mut self, signal: Signal) {
        let id = signal.id(self.config.dedup_include_price);

        // Not marked processed, so the same signal may legitimately retry
        // once the position returns to Flat
        if self.phase != Phase::Flat {
            info!(id = %id, phase = ?self.phase, "Signal rejected: position not flat");
            return;
        }

        if !self.ledger.is_new(&id) {
            debug!(id = %id, "Signal already processed, skipping");
            return;
        }

        let quantity = self.entry_quantity(&signal);
        let kind = match self.config.entry_order {
            EntryMode::Market => OrderKind::Market,
            EntryMode::Limit => OrderKind::Limit(signal.entry_price),
        };
        let order = OrderRequest {
            id: Uuid::new_v4(),
            role: OrderRole::Entry,
            direction: signal.direction,
            quantity,
            kind,
            reference_price: signal.entry_price,
        };

        match self.router.place(&order) {
            Ok(()) => {
                info!(
                    "[SIGNAL] {} @ {:.2} - entry submitted ({} contracts)",
                    signal.direction, signal.entry_price, quantity
                );
                self.ledger.mark_processed(id);
                self.active_signal = Some(signal);
                self.actual_entry_price = None;
                self.partial_exit_taken = false;
                self.phase = Phase::EntryPending;
            }
            Err(e) => {
                // Unmarked: the producer may re-emit and we retry next poll
                error!("Entry submission failed: {:#}", e);
            }
        }
    }

    /// Handle an order/position callback from the venue
    ///
    /// Events inconsistent with the current phase are tolerated as no-ops
    /// since delivery order relative to our state is not guaranteed.
    pub fn on_venue_event(&mut self, event: VenueEvent) {
        match event {
            VenueEvent::OrderFilled {
                role: OrderRole::Entry,
                price,
                quantity,
                ..
            } => self.on_entry_fill(price, quantity),
            VenueEvent::OrderFilled {
                role: OrderRole::Target1,
                price,
                quantity,
                ..
            } => self.on_first_target_fill(price, quantity),
            VenueEvent::OrderFilled {
                role,
                price,
                quantity,
                ..
            } => {
                // Stop / second-target fills; flatness arrives via PositionUpdate
                info!("[EXIT {:?}] {} contracts @ {:.2}", role, quantity, price);
            }
            VenueEvent::OrderRejected { role, reason, .. } => self.on_rejection(role, reason),
            VenueEvent::PositionUpdate {
                position: MarketPosition::Flat,
                ..
            } => self.on_position_flat(),
            VenueEvent::PositionUpdate { .. } => {}
        }
    }

    /// Entry sized per the signal's quantity plan, falling back to the
    /// configured contract count
    fn entry_quantity(&self, signal: &Signal) -> u32 {
        match signal.plan {
            ExitPlan::DualTarget {
                quantity_1,
                quantity_2,
                ..
            } => quantity_1 + quantity_2,
            _ => self.config.contract_quantity,
        }
    }

    fn on_entry_fill(&mut self, price: f64, quantity: u32) {
        if self.phase != Phase::EntryPending {
            debug!(phase = ?self.phase, "Entry fill while not pending, ignoring");
            return;
        }
        let signal = match self.active_signal.clone() {
            Some(s) => s,
            None => {
                debug!("Entry fill without an active signal, ignoring");
                return;
            }
        };

        self.actual_entry_price = Some(price);
        info!(
            "[FILLED] {} {} contracts @ {:.2} (signal ref {:.2})",
            signal.direction, quantity, price, signal.entry_price
        );

        // Stop is always submitted first: capital protection must be
        // acknowledged by the venue before the targets
        for order in bracket_orders(&signal, price, &self.config) {
            match self.router.place(&order) {
                Ok(()) => {
                    let level = match order.kind {
                        OrderKind::Limit(p) | OrderKind::StopMarket(p) => p,
                        OrderKind::Market => price,
                    };
                    info!(
                        "  {:?}: {:.2} ({} contracts)",
                        order.role, level, order.quantity
                    );
                }
                Err(e) => error!("Exit submission failed for {:?}: {:#}", order.role, e),
            }
        }

        self.phase = Phase::Filled;

        let entry = TradeLogEntry {
            entry_time: Utc::now(),
            signal,
            actual_entry_price: price,
        };
        // The trade is already live on the venue regardless of logging
        if let Err(e) = self.trade_log.append(&entry) {
            warn!("Trade log write failed: {:#}", e);
        }
    }

    fn on_first_target_fill(&mut self, price: f64, quantity: u32) {
        if self.phase != Phase::Filled && self.phase != Phase::Exiting {
            debug!(phase = ?self.phase, "Target fill while no position, ignoring");
            return;
        }
        info!("[EXIT PT1] {} contracts @ {:.2}", quantity, price);

        // Partial exit only exists on the dual-target plan; the venue's book
        // handles the stop's remaining-quantity adjustment, not us
        if let Some(Signal {
            plan: ExitPlan::DualTarget { .. },
            ..
        }) = self.active_signal
        {
            self.partial_exit_taken = true;
            self.phase = Phase::Exiting;
        }
    }

    fn on_rejection(&mut self, role: OrderRole, reason: String) {
        error!("[ERROR] Order rejected: {:?} - {}", role, reason);

        if role == OrderRole::Entry && self.phase == Phase::EntryPending {
            // Terminal for this signal: it stays marked processed and is
            // never auto-resubmitted
            self.active_signal = None;
            self.actual_entry_price = None;
            self.partial_exit_taken = false;
            self.phase = Phase::Flat;
        }
    }

    fn on_position_flat(&mut self) {
        if self.phase == Phase::Flat {
            return;
        }
        info!("Position flat, controller reset");
        self.active_signal = None;
        self.actual_entry_price = None;
        self.partial_exit_taken = false;
        self.phase = Phase::Flat;
    }
}

/// Build the re-anchored exit orders for a filled entry, stop first
///
/// The signal's stop/target distances from its own reference price are
/// re-applied to the actual fill price, preserving the intended risk/reward
/// ratio under slippage. The basic schema uses the configured point
/// distances instead.
pub fn bracket_orders(signal: &Signal, actual_entry: f64, config: &AppConfig) -> Vec<OrderRequest> {
    let sign = match signal.direction {
        Direction::Long => 1.0,
        Direction::Short => -1.0,
    };

    let (stop_distance, targets): (f64, Vec<(f64, u32)>) = match signal.plan {
        ExitPlan::FixedBracket => (
            config.stop_loss_points,
            vec![(config.profit_target_points, config.contract_quantity)],
        ),
        ExitPlan::SingleTarget {
            stop_loss,
            profit_target,
        } => (
            (signal.entry_price - stop_loss).abs(),
            vec![(
                (profit_target - signal.entry_price).abs(),
                config.contract_quantity,
            )],
        ),
        ExitPlan::DualTarget {
            stop_loss,
            profit_target_1,
            profit_target_2,
            quantity_1,
            quantity_2,
        } => (
            (signal.entry_price - stop_loss).abs(),
            vec![
                ((profit_target_1 - signal.entry_price).abs(), quantity_1),
                ((profit_target_2 - signal.entry_price).abs(), quantity_2),
            ],
        ),
    };

    let total_quantity: u32 = targets.iter().map(|(_, q)| q).sum();
    let stop_price = actual_entry - sign * stop_distance;

    let mut orders = vec![OrderRequest {
        id: Uuid::new_v4(),
        role: OrderRole::Stop,
        direction: signal.direction,
        quantity: total_quantity,
        kind: OrderKind::StopMarket(stop_price),
        reference_price: actual_entry,
    }];

    let target_roles = [OrderRole::Target1, OrderRole::Target2];
    for ((distance, quantity), role) in targets.into_iter().zip(target_roles) {
        orders.push(OrderRequest {
            id: Uuid::new_v4(),
            role,
            direction: signal.direction,
            quantity,
            kind: OrderKind::Limit(actual_entry + sign * distance),
            reference_price: actual_entry,
        });
    }

    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchemaKind;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Router that records every request and can be told to fail
    struct RecordingRouter {
        orders: Arc<Mutex<Vec<OrderRequest>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl OrderRouter for RecordingRouter {
        fn place(&mut self, order: &OrderRequest) -> anyhow::Result<()> {
            if *self.fail.lock().unwrap() {
                anyhow::bail!("venue unavailable");
            }
            self.orders.lock().unwrap().push(order.clone());
            Ok(())
        }
    }

    struct Harness {
        controller: PositionController,
        orders: Arc<Mutex<Vec<OrderRequest>>>,
        fail: Arc<Mutex<bool>>,
        dir: TempDir,
    }

    impl Harness {
        fn new(schema: SchemaKind) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = AppConfig::default();
            config.schema = schema;
            config.trades_log_file = dir
                .path()
                .join("trades_taken.csv")
                .to_string_lossy()
                .into_owned();

            let orders = Arc::new(Mutex::new(Vec::new()));
            let fail = Arc::new(Mutex::new(false));
            let router = RecordingRouter {
                orders: orders.clone(),
                fail: fail.clone(),
            };
            let trade_log = TradeLogWriter::new(&config.trades_log_file, schema);
            let controller = PositionController::new(config, Box::new(router), trade_log);

            Self {
                controller,
                orders,
                fail,
                dir,
            }
        }

        fn orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }

        fn trade_log_contents(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("trades_taken.csv")).unwrap_or_default()
        }

        fn fill_entry(&mut self, price: f64, quantity: u32) {
            self.controller.on_venue_event(VenueEvent::OrderFilled {
                order_id: Uuid::new_v4(),
                role: OrderRole::Entry,
                price,
                quantity,
            });
        }

        fn report_flat(&mut self) {
            self.controller.on_venue_event(VenueEvent::PositionUpdate {
                position: MarketPosition::Flat,
                quantity: 0,
                average_price: 0.0,
            });
        }
    }

    const LONG_LINE: &str = "01/02/2024 09:30:00,FVG,LONG,100.00,95.00,110.00,Bullish,1.5";
    const SHORT_LINE: &str = "01/02/2024 10:15:00,FVG,SHORT,100.00,105.00,90.00,Bearish,1.5";
    const DUAL_LINE: &str =
        "01/02/2024 09:30:00,FVG_RETEST,LONG,100.00,95.00,105.00,110.00,8,4,Bullish,1.5";

    #[test]
    fn test_signal_submits_entry_and_goes_pending() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);

        assert_eq!(h.controller.phase(), Phase::EntryPending);
        let orders = h.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].role, OrderRole::Entry);
        assert_eq!(orders[0].direction, Direction::Long);
        assert_eq!(orders[0].quantity, 12);
        assert_eq!(orders[0].kind, OrderKind::Market);
    }

    #[test]
    fn test_long_fill_reanchors_bracket_onto_actual_price() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);
        h.fill_entry(100.25, 12);

        assert_eq!(h.controller.phase(), Phase::Filled);
        assert_eq!(h.controller.actual_entry_price(), Some(100.25));

        let orders = h.orders();
        assert_eq!(orders.len(), 3);
        // Stop submitted before the target
        assert_eq!(orders[1].role, OrderRole::Stop);
        assert_eq!(orders[1].kind, OrderKind::StopMarket(95.25));
        assert_eq!(orders[1].quantity, 12);
        assert_eq!(orders[2].role, OrderRole::Target1);
        assert_eq!(orders[2].kind, OrderKind::Limit(110.25));

        // Exactly one trade-log row with the actual fill price
        let log = h.trade_log_contents();
        let rows: Vec<&str> = log.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("100.25"));
    }

    #[test]
    fn test_short_fill_reanchors_with_flipped_sign() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(SHORT_LINE);
        h.fill_entry(99.75, 12);

        let orders = h.orders();
        // Short: stop above, target below the fill
        assert_eq!(orders[1].kind, OrderKind::StopMarket(104.75));
        assert_eq!(orders[2].kind, OrderKind::Limit(89.75));
    }

    #[test]
    fn test_fixed_bracket_uses_configured_distances() {
        let mut h = Harness::new(SchemaKind::Basic);
        h.controller.on_signal_line("01/02/2024 09:30:00,LONG,5000.00");
        h.fill_entry(5001.0, 12);

        let orders = h.orders();
        // Defaults: 10.0 pt stop, 5.0 pt target
        assert_eq!(orders[1].kind, OrderKind::StopMarket(4991.0));
        assert_eq!(orders[2].kind, OrderKind::Limit(5006.0));
    }

    #[test]
    fn test_duplicate_signal_is_ignored_after_submission() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);
        h.fill_entry(100.25, 12);
        h.report_flat();

        // Same (timestamp, direction) again: no new entry
        h.controller.on_signal_line(LONG_LINE);
        assert_eq!(h.controller.phase(), Phase::Flat);
        assert_eq!(h.orders().len(), 3);
    }

    #[test]
    fn test_distinct_signals_are_independent() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);
        h.fill_entry(100.25, 12);
        h.report_flat();

        h.controller.on_signal_line(SHORT_LINE);
        assert_eq!(h.controller.phase(), Phase::EntryPending);
        assert_eq!(h.controller.ledger().len(), 2);
    }

    #[test]
    fn test_signal_while_not_flat_is_rejected_but_retryable() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);
        assert_eq!(h.controller.phase(), Phase::EntryPending);

        // A different signal arriving mid-trade is rejected without marking
        h.controller.on_signal_line(SHORT_LINE);
        assert_eq!(h.orders().len(), 1);
        assert_eq!(h.controller.ledger().len(), 1);

        h.fill_entry(100.25, 12);
        h.report_flat();

        // The rejected signal is still eligible once flat again
        h.controller.on_signal_line(SHORT_LINE);
        assert_eq!(h.controller.phase(), Phase::EntryPending);
    }

    #[test]
    fn test_entry_rejection_returns_to_flat_and_stays_consumed() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line(LONG_LINE);

        h.controller.on_venue_event(VenueEvent::OrderRejected {
            order_id: Uuid::new_v4(),
            role: OrderRole::Entry,
            reason: "insufficient margin".to_string(),
        });

        assert_eq!(h.controller.phase(), Phase::Flat);
        assert!(h.controller.active_signal().is_none());
        // No bracket orders, no trade-log row
        assert_eq!(h.orders().len(), 1);
        assert_eq!(h.trade_log_contents(), "");

        // Rejection is terminal for this signal
        h.controller.on_signal_line(LONG_LINE);
        assert_eq!(h.controller.phase(), Phase::Flat);
        assert_eq!(h.orders().len(), 1);
    }

    #[test]
    fn test_failed_submission_leaves_signal_unmarked() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        *h.fail.lock().unwrap() = true;

        h.controller.on_signal_line(LONG_LINE);
        assert_eq!(h.controller.phase(), Phase::Flat);
        assert!(h.controller.ledger().is_empty());

        // Venue recovers; the re-emitted signal goes through
        *h.fail.lock().unwrap() = false;
        h.controller.on_signal_line(LONG_LINE);
        assert_eq!(h.controller.phase(), Phase::EntryPending);
    }

    #[test]
    fn test_malformed_line_has_no_side_effects() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.controller.on_signal_line("01/02/2024 09:30:00,LONG,100.00");

        assert_eq!(h.controller.phase(), Phase::Flat);
        assert!(h.orders().is_empty());
        assert!(h.controller.ledger().is_empty());
    }

    #[test]
    fn test_fill_while_flat_is_a_noop() {
        let mut h = Harness::new(SchemaKind::SingleTarget);
        h.fill_entry(100.25, 12);

        assert_eq!(h.controller.phase(), Phase::Flat);
        assert!(h.orders().is_empty());
    }

    #[test]
    fn test_dual_target_splits_quantities_and_tracks_partial_exit() {
        let mut h = Harness::new(SchemaKind::DualTarget);
        h.controller.on_signal_line(DUAL_LINE);

        let orders = h.orders();
        assert_eq!(orders[0].quantity, 12); // 8 + 4

        h.fill_entry(100.5, 12);
        let orders = h.orders();
        assert_eq!(orders.len(), 4);
        assert_eq!(orders[1].role, OrderRole::Stop);
        assert_eq!(orders[1].quantity, 12);
        assert_eq!(orders[1].kind, OrderKind::StopMarket(95.5));
        assert_eq!(orders[2].role, OrderRole::Target1);
        assert_eq!(orders[2].quantity, 8);
        assert_eq!(orders[2].kind, OrderKind::Limit(105.5));
        assert_eq!(orders[3].role, OrderRole::Target2);
        assert_eq!(orders[3].quantity, 4);
        assert_eq!(orders[3].kind, OrderKind::Limit(110.5));

        // First target fills: partial exit, still in the market
        h.controller.on_venue_event(VenueEvent::OrderFilled {
            order_id: Uuid::new_v4(),
            role: OrderRole::Target1,
            price: 105.5,
            quantity: 8,
        });
        assert!(h.controller.partial_exit_taken());
        assert_eq!(h.controller.phase(), Phase::Exiting);

        h.report_flat();
        assert_eq!(h.controller.phase(), Phase::Flat);
        assert!(!h.controller.partial_exit_taken());
    }

    #[test]
    fn test_dedup_can_include_price_in_identity() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.schema = SchemaKind::SingleTarget;
        config.dedup_include_price = true;
        config.trades_log_file = dir
            .path()
            .join("trades_taken.csv")
            .to_string_lossy()
            .into_owned();

        let orders = Arc::new(Mutex::new(Vec::new()));
        let router = RecordingRouter {
            orders: orders.clone(),
            fail: Arc::new(Mutex::new(false)),
        };
        let trade_log = TradeLogWriter::new(&config.trades_log_file, config.schema);
        let mut controller = PositionController::new(config, Box::new(router), trade_log);

        controller.on_signal_line(LONG_LINE);
        controller.on_venue_event(VenueEvent::PositionUpdate {
            position: MarketPosition::Flat,
            quantity: 0,
            average_price: 0.0,
        });

        // Same timestamp/direction, different price: distinct identity now
        controller
            .on_signal_line("01/02/2024 09:30:00,FVG,LONG,101.00,96.00,111.00,Bullish,1.5");
        assert_eq!(controller.phase(), Phase::EntryPending);
        assert_eq!(orders.lock().unwrap().len(), 2);
    }
}
