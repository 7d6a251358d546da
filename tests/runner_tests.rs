use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::*;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tomcat_runner::error::{Error, Result};
use tomcat_runner::{
    Config, MemoryInfo, ServerConfig, ServerEvent, ServerId, ServerInstance, ServerStatus,
    Supervisor, TomcatRunner,
};

// Define a mock for the Supervisor trait
mock! {
    pub SupervisorMock {}

    #[async_trait]
    impl Supervisor for SupervisorMock {
        async fn start(&self, config: ServerConfig) -> Result<ServerInstance>;
        async fn stop(&self, id: ServerId) -> Result<()>;
        async fn status(&self, id: ServerId) -> Result<ServerInstance>;
        async fn memory(&self) -> Result<MemoryInfo>;
        async fn instances(&self) -> Result<Vec<ServerInstance>>;
        fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;
    }
}

const CONFIG: &str = r#"{
    "Servers": {
        "dev": { "AppServer": "tomcat7" },
        "qa": { "AppServer": "tomcat7" }
    },
    "AppServers": {
        "tomcat7": { "path": "/opt/tomcat7" }
    }
}"#;

fn instance(pid: u32, name: &str, status: ServerStatus) -> ServerInstance {
    ServerInstance {
        id: ServerId::from_pid(pid),
        config: ServerConfig::new(name, "/opt/tomcat7"),
        status,
        exit_code: None,
    }
}

// Helper function to create a runner over a mock supervisor
fn create_test_runner(mock: MockSupervisorMock) -> TomcatRunner<MockSupervisorMock> {
    TomcatRunner::with_supervisor(Config::parse_from_str(CONFIG).unwrap(), mock).unwrap()
}

#[tokio::test]
async fn test_start_server_resolves_config() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_start()
        .withf(|config| {
            config.name == "dev"
                && config.path == PathBuf::from("/opt/tomcat7")
                && config.script == "catalina"
                && config.app_server.as_deref() == Some("tomcat7")
        })
        .times(1)
        .returning(|config| {
            Ok(ServerInstance {
                id: ServerId::from_pid(100),
                config,
                status: ServerStatus::Starting,
                exit_code: None,
            })
        });

    let runner = create_test_runner(mock);
    let started = runner.start_server("dev").await?;

    assert_eq!(started.id, ServerId::from_pid(100));
    assert_eq!(started.status, ServerStatus::Starting);

    Ok(())
}

#[tokio::test]
async fn test_start_unknown_server() {
    let mut mock = MockSupervisorMock::new();
    mock.expect_start().times(0);

    let runner = create_test_runner(mock);
    let result = runner.start_server("prod").await;

    assert!(matches!(result, Err(Error::ServerNotFound(name)) if name == "prod"));
}

#[tokio::test]
async fn test_start_all_aggregates_failures() {
    let mut mock = MockSupervisorMock::new();
    mock.expect_start()
        .times(2)
        .returning(|config| Err(Error::Spawn(format!("no script for {}", config.name))));

    let runner = create_test_runner(mock);
    match runner.start_all_servers().await {
        Err(Error::Other(msg)) => {
            assert!(msg.contains("Multiple servers failed to start"));
            assert!(msg.contains("dev"));
            assert!(msg.contains("qa"));
        }
        other => panic!("expected aggregated error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_server_without_instance() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_instances().times(1).returning(|| Ok(Vec::new()));
    mock.expect_stop().times(0);

    let runner = create_test_runner(mock);
    runner.stop_server("dev").await
}

#[tokio::test]
async fn test_stop_server_that_already_exited() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_instances()
        .returning(|| Ok(vec![instance(7, "dev", ServerStatus::Running)]));
    mock.expect_stop()
        .with(eq(ServerId::from_pid(7)))
        .times(1)
        .returning(|id| Err(Error::UnknownInstance(id)));

    let runner = create_test_runner(mock);
    runner.stop_server("dev").await
}

#[tokio::test]
async fn test_stop_server_propagates_spawn_error() {
    let mut mock = MockSupervisorMock::new();
    mock.expect_instances()
        .returning(|| Ok(vec![instance(7, "dev", ServerStatus::Running)]));
    mock.expect_stop()
        .returning(|_| Err(Error::Spawn("stop script missing".to_string())));

    let runner = create_test_runner(mock);
    assert!(matches!(runner.stop_server("dev").await, Err(Error::Spawn(_))));
}

#[tokio::test]
async fn test_server_statuses() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_instances()
        .returning(|| Ok(vec![instance(7, "dev", ServerStatus::Running)]));

    let runner = create_test_runner(mock);

    assert_eq!(runner.server_status("dev").await?, ServerStatus::Running);
    assert_eq!(runner.server_status("qa").await?, ServerStatus::Ready);
    assert!(matches!(
        runner.server_status("prod").await,
        Err(Error::ServerNotFound(_))
    ));

    let statuses = runner.get_all_server_statuses().await?;
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses["dev"], ServerStatus::Running);
    assert_eq!(statuses["qa"], ServerStatus::Ready);

    Ok(())
}

#[tokio::test]
async fn test_active_instance_wins_over_failed() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_instances().returning(|| {
        Ok(vec![
            instance(7, "dev", ServerStatus::Failed),
            instance(9, "dev", ServerStatus::Running),
        ])
    });
    mock.expect_stop()
        .with(eq(ServerId::from_pid(9)))
        .times(1)
        .returning(|_| Ok(()));

    let runner = create_test_runner(mock);
    assert_eq!(runner.server_status("dev").await?, ServerStatus::Running);
    runner.stop_server("dev").await
}

#[tokio::test]
async fn test_memory_passes_through() -> Result<()> {
    let mut mock = MockSupervisorMock::new();
    mock.expect_memory().times(1).returning(|| {
        Ok(MemoryInfo {
            total: 8 << 30,
            free: 1 << 30,
        })
    });

    let runner = create_test_runner(mock);
    let memory = runner.memory().await?;
    assert_eq!(memory.free, 1 << 30);

    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::parse_from_str(r#"{ "Servers": { "dev": { "AppServer": "missing" } } }"#)
        .unwrap();
    let result = TomcatRunner::with_supervisor(config, MockSupervisorMock::new());
    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
}
