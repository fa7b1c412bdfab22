mod support;

use agentcycle::clock::SystemClock;
use agentcycle::credentials::StaticCredentials;
use agentcycle::executor::{CycleExecutor, ImprovementSettings};
use agentcycle::scheduler::{CycleScheduler, IntervalTable};
use agentcycle::types::{AgentSeed, AgentStatus, CycleType, ReportStatus};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeHost, FakeProvider};

const PERIOD: Duration = Duration::from_secs(10);

fn build(host: Arc<FakeHost>, settings: ImprovementSettings, token: Option<&str>) -> CycleScheduler {
    let executor = CycleExecutor::new(
        Arc::new(SystemClock::new()),
        Arc::new(StaticCredentials::new(token)),
        FakeProvider::new(host),
        settings,
    );
    CycleScheduler::new(executor, IntervalTable::new(PERIOD), 100)
}

fn offline() -> CycleScheduler {
    build(
        FakeHost::new("octo/widgets", "main"),
        ImprovementSettings::default(),
        None,
    )
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn cycles_one_to_four_run_in_rotation() {
    let scheduler = offline();
    scheduler
        .add_agent(AgentSeed::new("a1", "Alpha", "developer"))
        .await;
    scheduler.start().await;

    sleep_secs(45).await;
    scheduler.stop().await;

    let mut reports = scheduler.get_agent_reports("a1", 10).await;
    reports.reverse();
    let types: Vec<_> = reports.iter().map(|r| r.cycle_type).collect();
    assert_eq!(
        types,
        vec![
            CycleType::ToolDiscovery,
            CycleType::SelfAnalysis,
            CycleType::StateSave,
            CycleType::SelfImprovement,
        ]
    );
    let numbers: Vec<_> = reports.iter().map(|r| r.cycle_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);

    // no repository configured: the improvement cycle is skipped, not failed
    assert_eq!(reports[3].status, ReportStatus::Completed);
    assert_eq!(reports[3].metadata.get("skipped"), Some(&serde_json::json!(true)));

    let agent = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(agent.current_cycle, 4);
    assert_eq!(agent.cycle_stats.total_cycles, 4);
    assert_eq!(agent.cycle_stats.successful_cycles, 4);
}

#[tokio::test(start_paused = true)]
async fn first_tick_waits_one_period() {
    let scheduler = offline();
    scheduler
        .add_agent(AgentSeed::new("a1", "Alpha", "developer"))
        .await;
    scheduler.start().await;

    sleep_secs(9).await;
    assert!(scheduler.get_recent_reports(10).await.is_empty());
    sleep_secs(2).await;
    assert_eq!(scheduler.get_recent_reports(10).await.len(), 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn start_twice_does_not_duplicate_timers() {
    let scheduler = offline();
    scheduler
        .add_agent(AgentSeed::new("a1", "Alpha", "developer"))
        .await;
    scheduler.start().await;
    scheduler.start().await;
    assert!(scheduler.is_running());

    sleep_secs(35).await;
    scheduler.stop().await;

    assert_eq!(scheduler.get_agent_reports("a1", 100).await.len(), 3);
    assert_eq!(scheduler.get_agent("a1").await.unwrap().current_cycle, 3);
}

#[tokio::test(start_paused = true)]
async fn stop_idles_agents_and_halts_cycles() {
    let scheduler = offline();
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;
    scheduler.add_agent(AgentSeed::new("a2", "Beta", "analyst")).await;
    scheduler.start().await;

    for agent in scheduler.list_agents().await {
        assert_eq!(agent.status, AgentStatus::Active);
    }

    sleep_secs(15).await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    let before = scheduler.get_recent_reports(100).await.len();
    assert_eq!(before, 2);

    sleep_secs(60).await;
    assert_eq!(scheduler.get_recent_reports(100).await.len(), before);
    for agent in scheduler.list_agents().await {
        assert_eq!(agent.status, AgentStatus::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_resumes_numbering() {
    let scheduler = offline();
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;

    scheduler.start().await;
    sleep_secs(15).await;
    scheduler.stop().await;

    scheduler.start().await;
    sleep_secs(15).await;
    scheduler.stop().await;

    let numbers: Vec<_> = scheduler
        .get_agent_reports("a1", 10)
        .await
        .iter()
        .map(|r| r.cycle_number)
        .collect();
    assert_eq!(numbers, vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn recent_reports_are_bounded_and_descending() {
    let scheduler = offline();
    for i in 0..3 {
        scheduler
            .add_agent(AgentSeed::new(&format!("a{i}"), "Agent", "developer"))
            .await;
    }
    scheduler.start().await;
    sleep_secs(55).await;
    scheduler.stop().await;

    let all = scheduler.get_recent_reports(100).await;
    assert_eq!(all.len(), 15);

    let recent = scheduler.get_recent_reports(4).await;
    assert_eq!(recent.len(), 4);
    for pair in recent.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp);
    }
    assert_eq!(recent[0].id, all[0].id);
}

#[tokio::test]
async fn add_duplicate_returns_false_and_keeps_record() {
    let scheduler = offline();
    assert!(
        scheduler
            .add_agent(AgentSeed::new("a1", "Alpha", "developer"))
            .await
    );
    assert!(
        !scheduler
            .add_agent(AgentSeed::new("a1", "Other", "security"))
            .await
    );

    let agent = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(agent.name, "Alpha");
    assert_eq!(agent.role, "developer");
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.current_cycle, 0);
    assert_eq!(scheduler.list_agents().await.len(), 1);
}

#[tokio::test]
async fn add_without_id_generates_one() {
    let scheduler = offline();
    let seed = AgentSeed {
        id: None,
        name: "Anon".into(),
        role: "analyst".into(),
        credential: None,
    };
    assert!(scheduler.add_agent(seed).await);
    let agents = scheduler.list_agents().await;
    assert_eq!(agents.len(), 1);
    assert!(!agents[0].id.is_empty());
}

#[tokio::test(start_paused = true)]
async fn remove_agent_cancels_its_timer() {
    let scheduler = offline();
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;
    scheduler.add_agent(AgentSeed::new("a2", "Beta", "developer")).await;
    assert!(!scheduler.remove_agent("ghost").await);

    scheduler.start().await;
    sleep_secs(15).await;
    assert!(scheduler.remove_agent("a1").await);
    assert!(scheduler.get_agent("a1").await.is_none());

    sleep_secs(30).await;
    scheduler.stop().await;

    assert_eq!(scheduler.get_agent_reports("a1", 10).await.len(), 1);
    assert_eq!(scheduler.get_agent_reports("a2", 10).await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_skip_overlapping_ticks() {
    let host = FakeHost::new("octo/widgets", "main");
    host.set_latency(Duration::from_secs(25));
    let settings = ImprovementSettings {
        repository: "octo/widgets".into(),
        ..ImprovementSettings::default()
    };
    let scheduler = build(host.clone(), settings, Some("ghp_test"));
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;
    scheduler.start().await;

    // ticks at 10, 20, 30 run cycles 1-3; cycle 4 starts at 40 and holds the
    // agent until 65, so the ticks at 50 and 60 are skipped
    sleep_secs(45).await;
    assert_eq!(scheduler.in_flight().await, 1);
    assert_eq!(
        scheduler.get_agent("a1").await.unwrap().status,
        AgentStatus::Cycling
    );

    sleep_secs(30).await;
    scheduler.stop().await;

    assert_eq!(host.max_in_flight(), 1);
    assert_eq!(host.repository_calls(), 1);

    let mut numbers: Vec<_> = scheduler
        .get_agent_reports("a1", 100)
        .await
        .iter()
        .map(|r| r.cycle_number)
        .collect();
    numbers.reverse();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let agent = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(agent.cycle_stats.total_cycles, 5);
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_sets_error_and_retries_same_number() {
    // repository that does not parse makes the improvement cycle fail
    let settings = ImprovementSettings {
        repository: "not-a-repository".into(),
        ..ImprovementSettings::default()
    };
    let scheduler = build(
        FakeHost::new("octo/widgets", "main"),
        settings,
        Some("ghp_test"),
    );
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;
    scheduler.start().await;

    sleep_secs(35).await;
    let last_success = scheduler.get_agent("a1").await.unwrap().last_activity;

    sleep_secs(10).await;
    let agent = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Error);
    assert_eq!(agent.current_cycle, 3);

    sleep_secs(10).await;
    scheduler.stop().await;

    let reports = scheduler.get_agent_reports("a1", 2).await;
    assert_eq!(reports.len(), 2);
    for r in &reports {
        assert_eq!(r.cycle_number, 4);
        assert_eq!(r.status, ReportStatus::Failed);
        assert!(r.metadata.contains_key("error"));
    }

    // failed attempts leave the counters and last activity alone
    let agent = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(agent.cycle_stats.total_cycles, 3);
    assert_eq!(agent.cycle_stats.successful_cycles, 3);
    assert_eq!(agent.last_activity, last_success);
}

#[tokio::test(start_paused = true)]
async fn roles_tick_at_their_own_interval() {
    let executor = CycleExecutor::new(
        Arc::new(SystemClock::new()),
        Arc::new(StaticCredentials::new(None)),
        FakeProvider::new(FakeHost::new("octo/widgets", "main")),
        ImprovementSettings::default(),
    );
    let intervals = IntervalTable::new(Duration::from_secs(30))
        .with_role("fast", Duration::from_secs(5));
    let scheduler = CycleScheduler::new(executor, intervals, 100);
    scheduler.add_agent(AgentSeed::new("f", "Fast", "FAST")).await;
    scheduler.add_agent(AgentSeed::new("s", "Slow", "unlisted")).await;
    scheduler.start().await;

    sleep_secs(31).await;
    scheduler.stop().await;

    assert_eq!(scheduler.get_agent_reports("f", 100).await.len(), 6);
    assert_eq!(scheduler.get_agent_reports("s", 100).await.len(), 1);
}

#[tokio::test]
async fn failed_cycle_leaves_counters_and_activity_untouched() {
    let settings = ImprovementSettings {
        repository: "not-a-repository".into(),
        ..ImprovementSettings::default()
    };
    let scheduler = build(
        FakeHost::new("octo/widgets", "main"),
        settings,
        Some("ghp_test"),
    );
    scheduler.add_agent(AgentSeed::new("a1", "Alpha", "developer")).await;

    for _ in 0..3 {
        assert!(scheduler.run_cycle_now("a1").await.unwrap().is_success());
    }
    let before = scheduler.get_agent("a1").await.unwrap();

    let outcome = scheduler.run_cycle_now("a1").await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.report.cycle_number, 4);

    let after = scheduler.get_agent("a1").await.unwrap();
    assert_eq!(after.current_cycle, 3);
    assert_eq!(after.cycle_stats, before.cycle_stats);
    assert_eq!(after.cycle_stats.total_cycles, 3);
    assert_eq!(after.last_activity, before.last_activity);
    // scheduler is stopped, so the errored agent goes back to idle
    assert_eq!(after.status, AgentStatus::Idle);
}
