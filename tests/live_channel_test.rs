//! Integration tests for the live channel: registry fan-out, reducers and the
//! simulated source, driven on tokio's paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lodestar::live::{ChannelEvent, ChannelRegistry, SimulatedSource, SimulationConfig, SourceCommand};
use lodestar::models::{AgentState, LevelFilter};
use lodestar::reducers::{AgentsReducer, GraphReducer, LiveView, LogBuffer};

fn registry(seed: u64) -> ChannelRegistry {
    ChannelRegistry::with_source(SimulatedSource::new(SimulationConfig {
        seed: Some(seed),
        ..Default::default()
    }))
}

fn recorder() -> (Arc<Mutex<Vec<ChannelEvent>>>, impl Fn(&ChannelEvent) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |e: &ChannelEvent| sink.lock().unwrap().push(e.clone()))
}

/// Let timers due within `d` fire and their events be delivered.
async fn advance(d: Duration) {
    tokio::time::sleep(d).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn test_three_reducers_fold_the_same_stream() {
    let registry = registry(11);
    let agents = LiveView::attach(&registry, AgentsReducer::new("proj-a")).unwrap();
    let logs = LiveView::attach(&registry, LogBuffer::new("proj-a")).unwrap();
    let graph = LiveView::attach(&registry, GraphReducer::new("proj-a")).unwrap();
    assert_eq!(registry.subscriber_count("proj-a"), 3);

    advance(Duration::from_millis(4100)).await;

    // 5 agent ticks, 2 log ticks, 2 graph ticks
    assert_eq!(agents.with(|r| r.len()), 7);
    assert_eq!(logs.with(|b| b.total_received()), 2);
    assert_eq!(graph.with(|g| g.snapshots()), 2);
    let nodes = graph.with(|g| g.graph().nodes.len());
    assert!((2..=6).contains(&nodes));
    assert!(agents.with(|r| r.agents().iter().all(|a| a.percent <= 100)));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_delivery_and_source() {
    let registry = registry(5);
    let (events, callback) = recorder();
    let subscription = registry.subscribe("proj-b", callback).unwrap();

    advance(Duration::from_millis(900)).await;
    let delivered = events.lock().unwrap().len();
    assert_eq!(delivered, 7);

    subscription.unsubscribe();
    assert!(!registry.is_live("proj-b"));

    advance(Duration::from_secs(10)).await;
    assert_eq!(events.lock().unwrap().len(), delivered);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_starts_a_fresh_source() {
    let registry = registry(9);
    let first = LiveView::attach(&registry, GraphReducer::new("proj-c")).unwrap();
    advance(Duration::from_millis(6100)).await;
    assert_eq!(first.with(|g| g.snapshots()), 3);
    first.detach();
    drop(first);

    let second = LiveView::attach(&registry, GraphReducer::new("proj-c")).unwrap();
    advance(Duration::from_millis(2100)).await;
    second.with(|g| {
        assert_eq!(g.snapshots(), 1);
        assert!(g.graph().node("node-0").is_some());
        assert!(g.graph().nodes.len() <= 3);
    });
}

#[tokio::test(start_paused = true)]
async fn test_projects_are_isolated() {
    let registry = registry(2);
    let a = LiveView::attach(&registry, LogBuffer::new("proj-1")).unwrap();
    let b = LiveView::attach(&registry, LogBuffer::new("proj-2")).unwrap();

    advance(Duration::from_millis(1600)).await;
    assert!(a.with(|l| l.entries().all(|e| e.project_id == "proj-1")));
    assert!(b.with(|l| l.entries().all(|e| e.project_id == "proj-2")));
    assert_eq!(registry.live_projects(), vec!["proj-1", "proj-2"]);

    a.detach();
    assert_eq!(registry.live_projects(), vec!["proj-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_run_command_reaches_the_source() {
    let registry = registry(4);
    let agents = LiveView::attach(&registry, AgentsReducer::new("proj-r")).unwrap();
    advance(Duration::from_millis(900)).await;

    let target = agents.with(|r| {
        r.agents()
            .iter()
            .find(|a| a.status.can_transition_to(AgentState::Running))
            .map(|a| a.agent_id.clone())
    });
    if let Some(agent_id) = target {
        registry
            .send_command("proj-r", SourceCommand::RunAgent { agent_id: agent_id.clone() })
            .unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        agents.with(|r| {
            let agent = r.get(&agent_id).unwrap();
            assert_eq!(agent.status, AgentState::Running);
            assert_eq!(agent.percent, 0);
        });
    }
}

#[tokio::test(start_paused = true)]
async fn test_log_filter_over_live_buffer() {
    let registry = registry(8);
    let logs = LiveView::attach(&registry, LogBuffer::new("proj-l")).unwrap();
    advance(Duration::from_millis(30 * 1500 + 100)).await;

    logs.with(|b| {
        assert_eq!(b.len(), 30);
        let filtered = b.filter(LevelFilter::parse("warn").unwrap());
        assert!(filtered.len() < 30);
        assert_eq!(b.filter(LevelFilter::All).len(), 30);
    });
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_channel() {
    let registry = registry(1);
    let (events, callback) = recorder();
    let _sub = registry.subscribe("proj-s", callback).unwrap();
    registry.shutdown();

    advance(Duration::from_secs(5)).await;
    assert!(events.lock().unwrap().is_empty());
    assert!(registry.subscribe("proj-s", |_| {}).is_err());
}
