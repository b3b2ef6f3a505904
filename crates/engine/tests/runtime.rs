//! Runtime-level properties: deterministic replay under the test clock, the
//! backtest iteration order, and the live channel-drain loop.

use chrono::Duration;
use core_types::{Bar, BarType, OrderPurpose, OrderSide};
use engine::testing::{
    audusd_1min_bid, bar_with_close, test_harness, test_time, tick_with, RecordingStrategy,
    TestHarness,
};
use engine::{BacktestRunner, EngineInput, LiveRuntime, StrategyConfig, StrategyContext};
use rust_decimal_macros::dec;

/// Submits one market entry per bar, exercising generators, the factory, the
/// ledger, and the command path on every input.
struct EntryEachBar;

impl engine::Strategy for EntryEachBar {
    fn on_bar(
        &mut self,
        ctx: &mut StrategyContext,
        bar_type: &BarType,
        _bar: &Bar,
    ) -> anyhow::Result<()> {
        let position_id = ctx.generate_position_id()?;
        let order = ctx.order_factory().market(
            bar_type.symbol.clone(),
            OrderSide::Buy,
            dec!(1000),
            OrderPurpose::Entry,
        )?;
        ctx.submit_entry_order(order, position_id)?;
        Ok(())
    }
}

fn run_scripted_pass(harness: &mut TestHarness) -> String {
    harness.engine.start().unwrap();
    let bt = audusd_1min_bid();
    for (i, close) in [dec!(1.10), dec!(1.11), dec!(1.12)].iter().enumerate() {
        harness
            .engine
            .handle_bar(bt.clone(), bar_with_close(*close, i as i64));
    }
    harness.engine.stop().unwrap();
    let serialized = serde_json::to_string(&harness.exec.borrow().commands).unwrap();
    serialized
}

#[test]
fn reset_and_replay_reproduce_identical_command_sequences() {
    let mut harness = test_harness(Box::new(EntryEachBar), StrategyConfig::default());

    let first_pass = run_scripted_pass(&mut harness);
    harness.engine.reset().unwrap();
    harness.exec.borrow_mut().commands.clear();
    harness.exec.borrow_mut().orders.clear();

    let second_pass = run_scripted_pass(&mut harness);
    assert_eq!(first_pass, second_pass);
}

#[test]
fn backtest_runner_interleaves_timer_fires_before_bars() {
    let (strategy, calls) = RecordingStrategy::new();
    let mut harness = test_harness(strategy, StrategyConfig::default());
    harness.engine.start().unwrap();
    harness
        .engine
        .ctx_mut()
        .set_timer("minute-pulse", Duration::minutes(1))
        .unwrap();

    let TestHarness { engine, clock, .. } = harness;
    let mut runner = BacktestRunner::new(engine, clock).unwrap();

    // The bar is stamped three minutes out; three timer fires precede it.
    runner.process_bar(audusd_1min_bid(), bar_with_close(dec!(1.10), 3));

    let calls = calls.borrow();
    let sequence: Vec<&str> = calls.iter().map(|s| s.as_str()).collect();
    assert_eq!(
        sequence,
        vec!["on_start", "on_event", "on_event", "on_event", "on_bar"]
    );
}

#[test]
fn backtest_runner_drains_subscription_callbacks() {
    let (strategy, _calls) = RecordingStrategy::new();
    let mut harness = test_harness(strategy, StrategyConfig::default());
    harness.engine.start().unwrap();
    let bt = audusd_1min_bid();
    harness.engine.ctx_mut().subscribe_bars(&bt);

    let TestHarness {
        engine,
        clock,
        data,
        ..
    } = harness;
    let mut runner = BacktestRunner::new(engine, clock).unwrap();

    // The data client pushes through the subscription handler; the runner
    // dispatches it on the next step.
    data.borrow_mut().push_bar(&bt, bar_with_close(dec!(1.25), 0));
    runner.advance_to(test_time() + Duration::seconds(1));

    assert_eq!(
        runner.engine().ctx().last_bar(&bt).unwrap().close,
        dec!(1.25)
    );
}

#[tokio::test]
async fn live_runtime_drains_queued_input_then_shuts_down() {
    let (strategy, calls) = RecordingStrategy::new();
    let mut harness = test_harness(strategy, StrategyConfig::default());
    harness.engine.start().unwrap();

    let sender = harness.engine.input_sender();
    let (runtime, shutdown) = LiveRuntime::new(harness.engine).unwrap();

    sender
        .send(EngineInput::Tick(tick_with(dec!(1.00010), dec!(1.00020))))
        .unwrap();
    sender
        .send(EngineInput::Bar(
            audusd_1min_bid(),
            bar_with_close(dec!(1.10), 0),
        ))
        .unwrap();
    shutdown.shutdown();

    let engine = runtime.run().await;

    assert_eq!(
        engine.ctx().last_bar(&audusd_1min_bid()).unwrap().close,
        dec!(1.10)
    );
    let calls = calls.borrow();
    assert!(calls.contains(&"on_tick".to_string()));
    assert!(calls.contains(&"on_bar".to_string()));
}

#[test]
fn change_clock_rebuilds_generators_against_the_new_clock() {
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    let (strategy, _calls) = RecordingStrategy::new();
    let mut harness = test_harness(strategy, StrategyConfig::default());

    // Burn a few identifiers on the original clock.
    harness
        .engine
        .ctx_mut()
        .order_factory()
        .market(
            engine::testing::audusd(),
            OrderSide::Buy,
            dec!(1),
            OrderPurpose::None,
        )
        .unwrap();

    let later = chrono::Utc.with_ymd_and_hms(2020, 3, 15, 12, 0, 0).unwrap();
    let new_clock = Rc::new(RefCell::new(engine::TestClock::new(later)));
    harness.engine.change_clock(new_clock).unwrap();

    let order = harness
        .engine
        .ctx_mut()
        .order_factory()
        .market(
            engine::testing::audusd(),
            OrderSide::Buy,
            dec!(1),
            OrderPurpose::None,
        )
        .unwrap();
    assert_eq!(order.id.as_str(), "O-20200315-120000-000-EMA-001-1");
}
