//! Tests for configuration loading

use impeller::Config;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.listen_addr, "127.0.0.1:8080");
    assert_eq!(config.connection_threads, 10);
    assert_eq!(config.pool_threads, 25);
    assert_eq!(config.read_timeout_secs, 0);
    assert_eq!(config.write_timeout_secs, 0);
    assert!(!config.store_connections);
}

#[test]
fn test_full_yaml() {
    let yaml = r#"
listen_addr: "0.0.0.0:9090"
connection_threads: 4
pool_threads: 8
read_timeout_secs: 30
write_timeout_secs: 15
store_connections: true
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.listen_addr, "0.0.0.0:9090");
    assert_eq!(config.connection_threads, 4);
    assert_eq!(config.pool_threads, 8);
    assert_eq!(config.read_timeout_secs, 30);
    assert_eq!(config.write_timeout_secs, 15);
    assert!(config.store_connections);
}

#[test]
fn test_partial_yaml_falls_back_to_defaults() {
    let config: Config = serde_yaml::from_str("pool_threads: 2").unwrap();
    assert_eq!(config.pool_threads, 2);
    assert_eq!(config.listen_addr, "127.0.0.1:8080");
    assert_eq!(config.connection_threads, 10);
}

#[test]
fn test_round_trip() {
    let mut config = Config::default();
    config.listen_addr = "127.0.0.1:0".to_string();
    config.store_connections = true;

    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.listen_addr, config.listen_addr);
    assert_eq!(parsed.store_connections, config.store_connections);
}

#[test]
fn test_from_missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/impeller.yaml").is_err());
}
