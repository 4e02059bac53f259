use tether_core::*;

#[test]
fn test_container_id_validation() {
    // Valid references
    assert!(ContainerId::new("web").is_ok());
    assert!(ContainerId::new("deviceplane-web-1").is_ok());
    assert!(ContainerId::new("svc_456").is_ok());
    assert!(ContainerId::new("app.v2").is_ok());
    assert!(ContainerId::new("a".repeat(64)).is_ok());

    // Invalid - empty
    assert!(ContainerId::new("").is_err());

    // Invalid - too long
    assert!(ContainerId::new("a".repeat(129)).is_err());

    // Invalid - bad characters
    assert!(ContainerId::new("test@123").is_err());
    assert!(ContainerId::new("test space").is_err());
    assert!(ContainerId::new("test/path").is_err());
    assert!(ContainerId::new("test:colon").is_err());
    assert!(ContainerId::new(".hidden").is_err());
}

#[test]
fn test_container_id_display() {
    let id = ContainerId::new("my-container").unwrap();
    assert_eq!(format!("{id}"), "my-container");
    assert_eq!(id.as_str(), "my-container");
    assert_eq!("my-container".parse::<ContainerId>().unwrap(), id);
}

#[test]
fn test_service_status_serialization() {
    let status = ServiceStatus::new("rel_1", ServiceState::Exited).with_error("exit code 137");

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["current_release_id"], "rel_1");
    assert_eq!(json["current_state"], "exited");
    assert_eq!(json["error_message"], "exit code 137");

    let back: ServiceStatus = serde_json::from_value(json).unwrap();
    assert_eq!(back, status);
}
