//! Unit tests for the `manager` module.
//! `manager` 模块的单元测试。

use super::*;
use crate::config::ConnectionConfig;
use crate::connection::SetupStatus;
use crate::error::{Error, PairingError};
use crate::pairing::{ConfigEntry, PairingRecord};
use crate::testing::{MockClient, MockController, WarnCounter, init_tracing};
use crate::triggers::TriggerInfo;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

const A: &str = "AA:AA:AA:AA:AA:AA";
const B: &str = "BB:BB:BB:BB:BB:BB";
const C: &str = "CC:CC:CC:CC:CC:CC";

fn entry(pairing_id: &str) -> ConfigEntry {
    ConfigEntry::new(
        format!("entry-{pairing_id}"),
        format!("Accessory {pairing_id}"),
        PairingRecord::new(pairing_id),
    )
}

fn manager(controller: &Arc<MockController>) -> LifecycleManager {
    init_tracing();
    let config = Config {
        connection: ConnectionConfig {
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(30),
            unpair_timeout: Duration::from_secs(10),
        },
        ..Config::default()
    };
    LifecycleManager::new(config, controller.clone())
}

#[tokio::test]
async fn test_setup_success_registers_established_handle() {
    let controller = MockController::new();
    let manager = manager(&controller);

    let mut a = entry(A);
    manager.setup(&mut a).await.unwrap();

    let handle = manager.registry().lookup(&DeviceId::new(A)).unwrap();
    assert_eq!(handle.status(), SetupStatus::Established);
    assert_eq!(controller.client(A).connect_calls(), 1);
    assert_eq!(a.unique_id.as_deref(), Some("aa:aa:aa:aa:aa:aa"));
}

#[tokio::test]
async fn test_transient_failures_roll_back_registration() {
    let transient = [
        PairingError::AccessoryNotFound,
        PairingError::AccessoryDisconnected,
        PairingError::Encryption("bad tag".into()),
        PairingError::Timeout,
    ];

    for kind in transient {
        let controller = MockController::new();
        controller.script(A, MockClient::new().with_connect_error(kind.clone()));
        let manager = manager(&controller);

        let err = manager.setup(&mut entry(A)).await.unwrap_err();
        assert!(err.is_retryable(), "{kind:?} should be retryable");
        assert!(matches!(manager.registry().lookup(&DeviceId::new(A)), Err(Error::NotFound(_))));
        assert_eq!(controller.client(A).close_calls(), 1, "{kind:?} should close the session");
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_retryable() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_connect_delay(Duration::from_secs(60)));
    let manager = manager(&controller);

    let started = Instant::now();
    let err = manager.setup(&mut entry(A)).await.unwrap_err();

    assert!(matches!(err, Error::NotReady { source: PairingError::Timeout, .. }));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(manager.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_close_timeout_is_suppressed() {
    let controller = MockController::new();
    controller.script(
        A,
        MockClient::new()
            .with_connect_error(PairingError::AccessoryNotFound)
            .with_close_delay(Duration::from_secs(600)),
    );
    let manager = manager(&controller);

    let err = manager.setup(&mut entry(A)).await.unwrap_err();
    assert!(matches!(err, Error::NotReady { source: PairingError::AccessoryNotFound, .. }));
}

#[tokio::test]
async fn test_cleanup_close_error_is_discarded() {
    let controller = MockController::new();
    controller.script(
        A,
        MockClient::new()
            .with_connect_error(PairingError::Encryption("mac".into()))
            .with_close_error(PairingError::Unknown("socket gone".into())),
    );
    let manager = manager(&controller);

    let err = manager.setup(&mut entry(A)).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_fatal_failure_propagates_and_evicts() {
    let controller = MockController::new();
    controller.script(
        A,
        MockClient::new().with_connect_error(PairingError::Authentication("bad proof".into())),
    );
    let manager = manager(&controller);

    let err = manager.setup(&mut entry(A)).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(matches!(err, Error::Setup { source: PairingError::Authentication(_), .. }));
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_load_failure_is_fatal_and_registers_nothing() {
    let controller = MockController::new();
    controller.fail_loads(PairingError::Protocol("corrupt record".into()));
    let manager = manager(&controller);

    let err = manager.setup(&mut entry(A)).await.unwrap_err();
    assert!(matches!(err, Error::Pairing(PairingError::Protocol(_))));
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_setup_twice_for_same_identity_is_rejected() {
    let controller = MockController::new();
    let manager = manager(&controller);

    manager.setup(&mut entry(A)).await.unwrap();
    let err = manager.setup(&mut entry(&A.to_lowercase())).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateIdentity(_)));
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_is_addressable_while_connecting() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_connect_delay(Duration::from_secs(5)));
    let manager = manager(&controller);

    let setup = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.setup(&mut entry(A)).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let handle = manager.registry().lookup(&DeviceId::new(A)).unwrap();
    assert_eq!(handle.status(), SetupStatus::Pending);

    setup.await.unwrap().unwrap();
    assert_eq!(handle.status(), SetupStatus::Established);
}

#[tokio::test(start_paused = true)]
async fn test_unload_during_connect_keeps_handle_unloaded() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_connect_delay(Duration::from_secs(5)));
    let manager = manager(&controller);

    let setup = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.setup(&mut entry(A)).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let handle = manager.registry().lookup(&DeviceId::new(A)).unwrap();

    assert_eq!(manager.shutdown_all().await, 1);
    setup.await.unwrap().unwrap();

    assert_eq!(handle.status(), SetupStatus::Unloaded);
    assert!(manager.registry().is_empty());
    // Once by the unload, once more for the session the handshake opened.
    assert_eq!(controller.client(A).close_calls(), 2);
}

#[tokio::test]
async fn test_mixed_setup_then_shutdown_unloads_only_established() {
    let controller = MockController::new();
    controller.script(B, MockClient::new().with_connect_error(PairingError::AccessoryNotFound));
    let manager = manager(&controller);

    manager.setup(&mut entry(A)).await.unwrap();
    let err = manager.setup(&mut entry(B)).await.unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(manager.registry().identities(), vec![DeviceId::new(A)]);

    let b_closes = controller.client(B).close_calls();
    assert_eq!(manager.shutdown_all().await, 1);
    assert_eq!(controller.client(A).close_calls(), 1);
    assert_eq!(controller.client(B).close_calls(), b_closes);
    assert!(manager.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fans_out_concurrently() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_close_delay(Duration::from_secs(1)));
    controller.script(B, MockClient::new().with_close_delay(Duration::from_secs(5)));
    controller.script(C, MockClient::new().with_close_delay(Duration::from_secs(1)));
    let manager = manager(&controller);
    for id in [A, B, C] {
        manager.setup(&mut entry(id)).await.unwrap();
    }

    let started = Instant::now();
    assert_eq!(manager.shutdown_all().await, 3);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(5), "waited for the slowest unload");
    assert!(elapsed < Duration::from_secs(7), "unloads ran one after another: {elapsed:?}");
    for id in [A, B, C] {
        assert_eq!(controller.client(id).close_calls(), 1);
    }
}

#[tokio::test]
async fn test_shutdown_survives_failing_unload() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_close_error(PairingError::AccessoryDisconnected));
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();
    manager.setup(&mut entry(B)).await.unwrap();

    assert_eq!(manager.shutdown_all().await, 2);
    assert!(manager.registry().is_empty());
    assert_eq!(controller.client(B).close_calls(), 1);
}

#[tokio::test]
async fn test_shutdown_clears_triggers() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();
    manager.triggers().insert(
        "orphan",
        TriggerInfo {
            identity: DeviceId::new(C),
            subtype: "single_press".into(),
        },
    );

    manager.shutdown_all().await;
    assert!(manager.triggers().is_empty());
}

#[tokio::test]
async fn test_stop_listener_fires_exactly_once() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();

    let (first_tx, first_rx) = oneshot::channel::<()>();
    let (second_tx, second_rx) = oneshot::channel::<()>();
    let listener = manager
        .listen_for_stop(async move {
            let _ = first_rx.await;
        })
        .expect("first registration installs the listener");
    assert!(
        manager
            .listen_for_stop(async move {
                let _ = second_rx.await;
            })
            .is_none()
    );

    let _ = second_tx.send(());
    let _ = first_tx.send(());
    assert_eq!(listener.await.unwrap(), 1);

    assert_eq!(controller.client(A).close_calls(), 1);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_unload_single_device() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();
    manager.setup(&mut entry(B)).await.unwrap();
    manager.triggers().insert(
        "a-button",
        TriggerInfo {
            identity: DeviceId::new(A),
            subtype: "single_press".into(),
        },
    );

    assert!(manager.unload(A).await);
    assert!(!manager.registry().contains(&DeviceId::new(A)));
    assert!(manager.registry().contains(&DeviceId::new(B)));
    assert!(manager.triggers().is_empty());

    // Never set up, or already gone.
    assert!(!manager.unload(A).await);
    assert!(!manager.unload(C).await);
    assert_eq!(controller.client(A).close_calls(), 1);
}

#[tokio::test]
async fn test_remove_unpairs_with_fresh_client() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();
    let loads = controller.loads();

    manager.remove(&entry(A)).await.unwrap();

    assert_eq!(controller.loads(), loads + 1);
    assert_eq!(controller.client(A).unpair_calls(), 1);
}

#[tokio::test]
async fn test_remove_unloads_live_connection() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();
    let live = manager.registry().lookup(&DeviceId::new(A)).unwrap();
    manager.triggers().insert(
        "aa-button",
        TriggerInfo {
            identity: DeviceId::new(A),
            subtype: "button1".into(),
        },
    );

    manager.remove(&entry(A)).await.unwrap();

    // 1. The live handle is gone, together with its triggers.
    assert_eq!(live.status(), SetupStatus::Unloaded);
    assert!(manager.registry().is_empty());
    assert!(manager.triggers().is_empty());
    assert_eq!(controller.client(A).unpair_calls(), 1);

    // 2. The pairing can be set up again.
    manager.setup(&mut entry(A)).await.unwrap();
    assert!(manager.registry().contains(&DeviceId::new(A)));
}

#[tokio::test]
async fn test_remove_unreachable_device_warns_once() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_unpair_error(PairingError::AccessoryDisconnected));
    let manager = manager(&controller);
    let (warnings, _guard) = WarnCounter::install();

    manager.remove(&entry(A)).await.unwrap();

    assert_eq!(warnings.count(), 1);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_remove_other_failures_are_fatal() {
    for kind in [
        PairingError::AccessoryNotFound,
        PairingError::Timeout,
        PairingError::Authentication("bad proof".into()),
    ] {
        let controller = MockController::new();
        controller.script(A, MockClient::new().with_unpair_error(kind.clone()));
        let manager = manager(&controller);

        let err = manager.remove(&entry(A)).await.unwrap_err();
        assert!(matches!(err, Error::Unpair { ref source, .. } if *source == kind));
    }
}

#[tokio::test]
async fn test_provision_reaches_registered_device() {
    let controller = MockController::new();
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();

    let payload = serde_json::json!({
        "hkid": A,
        "network_name": "home",
        "channel": 25,
        "pan_id": "abcd",
        "extended_pan_id": "dead00beef00cafe",
        "network_key": "00112233445566778899aabbccddeeff",
        "unknown": 1,
    });
    manager.handle_thread_provision(&payload).await.unwrap();

    assert_eq!(controller.client(A).provisioned().len(), 1);
}

#[tokio::test]
async fn test_device_identifiers_and_removal_check() {
    let controller = MockController::new();
    controller.script(A, MockClient::new().with_accessory_ids(vec![1, 2]));
    let manager = manager(&controller);
    manager.setup(&mut entry(A)).await.unwrap();

    let ids = manager.device_identifiers(A).unwrap();
    let expected: Vec<_> = ids.iter().map(|id| id.id.as_str()).collect();
    assert_eq!(expected, vec!["aa:aa:aa:aa:aa:aa:aid:1", "aa:aa:aa:aa:aa:aa:aid:2"]);
    assert!(ids.iter().all(|id| id.domain == "homekit_controller"));

    let ours = DeviceIdentifier::new("homekit_controller", "aa:aa:aa:aa:aa:aa:aid:2");
    let foreign = DeviceIdentifier::new("homekit_controller", "bb:bb:bb:bb:bb:bb:aid:1");
    assert!(!manager.can_remove_device(A, [&ours, &foreign]).unwrap());
    assert!(manager.can_remove_device(A, [&foreign]).unwrap());

    assert!(matches!(manager.device_identifiers(B), Err(Error::NotFound(_))));
}
