use meshchat::config::{Config, ConfigError, Transport};
use meshchat::meshtastic::link::LinkSpec;
use tempfile::tempdir;

#[tokio::test]
async fn loads_a_written_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meshchat.toml");
    tokio::fs::write(
        &path,
        r#"
[meshtastic]
transport = "tcp"
host = "meshnode.local"
channel = 2
min_send_gap_ms = 250

[chat]
history_lines = 50
timestamp_format = "%H:%M"

[logging]
level = "debug"
"#,
    )
    .await
    .unwrap();

    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    assert_eq!(config.meshtastic.transport, Transport::Tcp);
    assert_eq!(config.meshtastic.channel, 2);
    assert_eq!(config.meshtastic.min_send_gap_ms, 250);
    assert_eq!(config.meshtastic.heartbeat_secs, 300);
    assert_eq!(config.chat.history_lines, 50);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, None);
    assert_eq!(
        config.meshtastic.link_spec(),
        Ok(LinkSpec::Tcp {
            host: "meshnode.local".into(),
            port: 4403
        })
    );
    assert_eq!(config.validate(), Ok(()));
}

#[tokio::test]
async fn missing_file_means_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config = Config::load_or_default(path.to_str().unwrap()).await.unwrap();
    assert_eq!(config.meshtastic.port, "/dev/ttyUSB0");
    assert!(Config::load(path.to_str().unwrap()).await.is_err());
}

#[tokio::test]
async fn create_default_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meshchat.toml");
    let path = path.to_str().unwrap();
    Config::create_default(path).await.unwrap();
    let config = Config::load(path).await.unwrap();
    assert_eq!(config.validate(), Ok(()));
    assert_eq!(config.chat.timestamp_format, "%H:%M:%S");
    assert_eq!(config.logging.file.as_deref(), Some("meshchat.log"));
}

#[tokio::test]
async fn bad_values_are_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    tokio::fs::write(&path, "[meshtastic]\nchannel = 12\n")
        .await
        .unwrap();
    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    assert_eq!(config.validate(), Err(ConfigError::ChannelOutOfRange(12)));

    tokio::fs::write(&path, "[chat]\ntimestamp_format = \"%H:%Q\"\n")
        .await
        .unwrap();
    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    assert_eq!(
        config.validate(),
        Err(ConfigError::BadTimestampFormat("%H:%Q".into()))
    );

    tokio::fs::write(&path, "[meshtastic\nport = ").await.unwrap();
    let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
}
