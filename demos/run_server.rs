use futures::StreamExt;
use tomcat_runner::error::Result;
use tomcat_runner::{ServerEvent, TomcatRunner};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    // Usage: run_server <config> <server> [seconds]
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "demos/config.json".to_string());
    let server = args.next().unwrap_or_else(|| "dev".to_string());
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);

    let runner = TomcatRunner::from_config_file(&config_path)?;
    let events = runner.subscribe();

    println!("Starting {}...", server);
    let instance = runner.start_server(&server).await?;
    println!("Launched as pid {}", instance.id);

    let mut stream = Box::pin(tomcat_runner::bridge::instance_events(events, instance.id));
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut stopping = false;

    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(ServerEvent::Started { success, .. }) => {
                    println!("== started (success: {})", success);
                }
                Some(ServerEvent::Message { record, .. }) => println!("[{}] {}", record.level, record.text),
                Some(ServerEvent::Stopped { exit_code, signal, expected, .. }) => {
                    println!("== stopped (code: {:?}, signal: {:?}, expected: {})", exit_code, signal, expected);
                }
                None => break,
            },
            _ = &mut deadline, if !stopping => {
                println!("Stopping {}...", server);
                runner.stop_server(&server).await?;
                stopping = true;
            }
        }
    }

    println!("Memory: {:?}", runner.memory().await?);
    Ok(())
}
