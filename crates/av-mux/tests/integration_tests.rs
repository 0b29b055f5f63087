//! Integration tests for the AV matrix router
//!
//! These tests run the real driver tasks against simulated matrices over
//! in-memory cables, with the tokio clock paused so retry and debounce
//! windows elapse instantly:
//! - Bring-up and full-update handling for each protocol
//! - Ack timeouts and retry exhaustion
//! - Virtual routes applied across both matrices
//! - Offline mode and driver shutdown

use std::time::Duration;

use av_mux::{
    CommandError, DriverId, DriverStatus, MatrixDriver, MatrixEvent, MatrixHandle, Router,
    VirtualInput, VirtualOutput,
};
use av_protocol::{hdmi, Protocol};
use av_sim::{spawn_simulated, SimulatedMatrix};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Generous bound for anything that should settle; the clock is paused
    pub const SETTLE: Duration = Duration::from_secs(60);

    /// Start a driver against a fresh simulated matrix
    pub fn simulated_driver(
        id: DriverId,
        protocol: Protocol,
        event_tx: mpsc::Sender<MatrixEvent>,
    ) -> (MatrixHandle, SimulatedMatrix) {
        let (stream, sim) = spawn_simulated(protocol);
        let handle = MatrixDriver::new(id, protocol, event_tx)
            .init_with_io(&format!("sim:{}", protocol.name()), stream);
        (handle, sim)
    }

    /// Receive events until one matches
    pub async fn wait_for_event(
        event_rx: &mut mpsc::Receiver<MatrixEvent>,
        mut predicate: impl FnMut(&MatrixEvent) -> bool,
    ) -> MatrixEvent {
        timeout(SETTLE, async {
            loop {
                match event_rx.recv().await {
                    Some(event) if predicate(&event) => return event,
                    Some(_) => {}
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("event never arrived")
    }

    /// Wait until the driver reports outputs matching the predicate
    pub async fn wait_for_outputs(
        handle: &MatrixHandle,
        mut predicate: impl FnMut(&[u8]) -> bool,
    ) {
        let mut state_rx = handle.subscribe();
        let settled = state_rx.wait_for(|snapshot| predicate(snapshot.outputs.as_slice()));
        timeout(SETTLE, settled)
            .await
            .expect("outputs never settled")
            .expect("driver dropped its state");
    }

    /// Wait for the first full update so the queue is idle
    pub async fn wait_until_settled(event_rx: &mut mpsc::Receiver<MatrixEvent>) {
        wait_for_event(event_rx, |e| e.is_state_change()).await;
    }
}

use helpers::*;

// ============================================================================
// Driver Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hdmi_route_round_trip() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (hdmi, sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx);

    let event = wait_for_event(&mut event_rx, |e| e.is_state_change()).await;
    assert_eq!(
        event,
        MatrixEvent::StateChanged {
            driver: DriverId::Hdmi,
            outputs: vec![0, 1, 2, 3, 4, 5, 6, 7],
        }
    );
    assert_eq!(hdmi.outputs(), vec![0, 1, 2, 3, 4, 5, 6, 7]);

    let ticket = hdmi.set_output(Some(0), 7);
    assert_eq!(ticket.wait().await, Ok(()));

    // The echo triggers a full update that carries the new route
    let event = wait_for_event(&mut event_rx, |e| {
        matches!(e, MatrixEvent::StateChanged { outputs, .. } if outputs[0] == 7)
    })
    .await;
    assert_eq!(
        event,
        MatrixEvent::StateChanged {
            driver: DriverId::Hdmi,
            outputs: vec![7, 1, 2, 3, 4, 5, 6, 7],
        }
    );
    wait_for_outputs(&hdmi, |outputs| outputs[0] == 7).await;
    assert_eq!(sim.outputs()[0], 7);
}

#[tokio::test(start_paused = true)]
async fn test_hdmi_front_panel_change_is_picked_up() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (hdmi, sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx);
    wait_until_settled(&mut event_rx).await;

    sim.front_panel(5, 2).await;
    wait_for_outputs(&hdmi, |outputs| outputs[5] == 2).await;
}

#[tokio::test(start_paused = true)]
async fn test_extron_route_round_trip() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (component, sim) = simulated_driver(DriverId::Component, Protocol::Extron, event_tx);
    wait_until_settled(&mut event_rx).await;

    assert_eq!(component.set_output(Some(1), 2).wait().await, Ok(()));
    wait_for_outputs(&component, |outputs| outputs[1] == 2).await;
    assert_eq!(sim.outputs(), vec![0, 2, 2, 3, 4, 5, 6, 7]);
}

#[tokio::test(start_paused = true)]
async fn test_sb_bring_up_and_ack() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (component, _sim) = simulated_driver(DriverId::Component, Protocol::Sb, event_tx);

    // SBRSTACK puts every output on input 0
    wait_until_settled(&mut event_rx).await;
    assert_eq!(component.outputs(), vec![0; 8]);

    assert_eq!(component.set_output(Some(4), 2).wait().await, Ok(()));
    wait_for_outputs(&component, |outputs| outputs[4] == 2).await;
    assert_eq!(component.outputs(), vec![0, 0, 0, 0, 2, 0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_matrix_exhausts_retries() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (hdmi, sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx);
    wait_until_settled(&mut event_rx).await;

    sim.set_silent(true).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let start = Instant::now();
    let result = hdmi.set_output(Some(2), 3).wait().await;
    assert_eq!(result, Err(CommandError::RetriesExhausted { attempts: 5 }));

    // Five 1500 ms waits with a 250 ms pause between each
    assert!(start.elapsed() >= Duration::from_millis(8500));

    let event = wait_for_event(&mut event_rx, |e| e.is_error()).await;
    assert!(matches!(
        event,
        MatrixEvent::CommandFailed {
            driver: DriverId::Hdmi,
            attempts: 5
        }
    ));

    // The state never moved
    assert_eq!(hdmi.outputs()[2], 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_still_acks() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (hdmi, sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx);
    wait_until_settled(&mut event_rx).await;

    sim.set_silent(true).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    let ticket = hdmi.set_output(Some(3), 0);

    // Miss the first attempt, then answer the resend
    tokio::time::sleep(Duration::from_millis(1600)).await;
    sim.set_silent(false).await;

    assert_eq!(ticket.wait().await, Ok(()));
    wait_for_outputs(&hdmi, |outputs| outputs[3] == 0).await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_serialized() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (component, sim) = simulated_driver(DriverId::Component, Protocol::Sb, event_tx);
    wait_until_settled(&mut event_rx).await;

    let tickets: Vec<_> = (0..8u8)
        .map(|output| component.set_output(Some(output), 7 - output))
        .collect();
    for ticket in tickets {
        assert_eq!(ticket.wait().await, Ok(()));
    }

    wait_for_outputs(&component, |outputs| outputs == [7, 6, 5, 4, 3, 2, 1, 0]).await;
    assert_eq!(sim.outputs(), vec![7, 6, 5, 4, 3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_next_command_waits_for_retries_to_run_out() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (host, mut device) = duplex(4096);
    let driver = MatrixDriver::new(DriverId::Hdmi, Protocol::Hdmi, event_tx)
        .init_with_io("sim:wire", host);

    // Answer the opening full update, then never reply again
    let mut buf = [0u8; 256];
    let n = device.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b">@R8006\r\n");
    let reply = format!("{}\r\n", hdmi::format_full_update(&[0, 1, 2, 3, 4, 5, 6, 7]));
    device.write_all(reply.as_bytes()).await.unwrap();
    wait_until_settled(&mut event_rx).await;

    // Timestamp every write that reaches the device
    let (wire_tx, mut wire_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        while let Ok(n) = device.read(&mut buf).await {
            if n == 0 {
                break;
            }
            let _ = wire_tx.send((Instant::now(), buf[..n].to_vec()));
        }
    });

    let first = driver.set_output(Some(0), 1);
    let second = driver.set_output(Some(1), 2);

    assert_eq!(first.wait().await, Err(CommandError::RetriesExhausted { attempts: 5 }));
    let first_failed = Instant::now();
    assert_eq!(second.wait().await, Err(CommandError::RetriesExhausted { attempts: 5 }));

    let mut writes = Vec::new();
    while let Ok(write) = wire_rx.try_recv() {
        writes.push(write);
    }
    reader.abort();

    let first_bytes = b">@WVSO[01]I[02]\r\n".to_vec();
    let second_bytes = b">@WVSO[02]I[03]\r\n".to_vec();
    let wire: Vec<&Vec<u8>> = writes.iter().map(|(_, bytes)| bytes).collect();
    let mut expected = vec![&first_bytes; 5];
    expected.extend(vec![&second_bytes; 5]);
    assert_eq!(wire, expected);

    // The second command only hits the wire once the first has given up
    let last_first_attempt = writes[4].0;
    let second_start = writes[5].0;
    assert!(second_start >= last_first_attempt + Duration::from_millis(1500));
    assert!(second_start >= first_failed);
}

#[tokio::test(start_paused = true)]
async fn test_closed_cable_stops_driver() {
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (hdmi, sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx);
    wait_until_settled(&mut event_rx).await;

    sim.shutdown().await;

    let mut state_rx = hdmi.subscribe();
    timeout(SETTLE, state_rx.wait_for(|s| s.status == DriverStatus::Disconnected))
        .await
        .expect("driver never noticed the closed cable")
        .unwrap();

    // Commands after the driver stopped are rejected
    assert_eq!(
        hdmi.set_output(Some(0), 1).wait().await,
        Err(CommandError::DriverStopped)
    );
}

#[tokio::test]
async fn test_open_missing_port_fails() {
    let (event_tx, _event_rx) = mpsc::channel(16);
    let result = MatrixDriver::new(DriverId::Hdmi, Protocol::Hdmi, event_tx)
        .init("/dev/av-router-missing-port");
    assert!(matches!(
        result,
        Err(av_mux::MuxError::OpenFailed {
            driver: DriverId::Hdmi,
            ..
        })
    ));
}

#[tokio::test]
async fn test_offline_driver_accepts_everything() {
    let (event_tx, _event_rx) = mpsc::channel(16);
    let component =
        MatrixDriver::new(DriverId::Component, Protocol::Extron, event_tx).init_offline();

    assert_eq!(component.set_output(Some(3), 1).wait().await, Ok(()));
    assert_eq!(component.outputs(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(component.status(), DriverStatus::Disconnected);
}

// ============================================================================
// Router Tests
// ============================================================================

fn simulated_router(component: Protocol) -> (Router, SimulatedMatrix, SimulatedMatrix) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let (hdmi, hdmi_sim) = simulated_driver(DriverId::Hdmi, Protocol::Hdmi, event_tx.clone());
    let (comp, comp_sim) = simulated_driver(DriverId::Component, component, event_tx);
    (Router::start(hdmi, comp, event_rx), hdmi_sim, comp_sim)
}

async fn wait_for_virtual(router: &Router, output: VirtualOutput, input: Option<VirtualInput>) {
    let mut virtual_rx = router.subscribe();
    timeout(SETTLE, virtual_rx.wait_for(|state| state[output.index()] == input))
        .await
        .expect("virtual state never settled")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tv_scart_route_end_to_end() {
    let (router, hdmi_sim, comp_sim) = simulated_router(Protocol::Extron);

    let tickets = router.set_route(VirtualOutput::Tv4, VirtualInput::Scart2);
    assert_eq!(tickets.component.len(), 2);
    assert_eq!(tickets.wait().await, Ok(()));

    wait_for_virtual(&router, VirtualOutput::Tv4, Some(VirtualInput::Scart2)).await;

    // LCD_4 <- OSSC_2, OSSC_2 <- SCART_2, CRT_4 <- SCART_2
    assert_eq!(hdmi_sim.outputs()[7], 1);
    assert_eq!(comp_sim.outputs()[1], 2);
    assert_eq!(comp_sim.outputs()[7], 2);

    // The LCD_4 and CRT_4 views agree with the TV
    let state = router.virtual_state();
    assert_eq!(state[VirtualOutput::Lcd4.index()], Some(VirtualInput::Scart2));
    assert_eq!(state[VirtualOutput::Crt4.index()], Some(VirtualInput::Scart2));
}

#[tokio::test(start_paused = true)]
async fn test_hdmi_source_on_tv_reads_as_null() {
    let (router, _hdmi_sim, comp_sim) = simulated_router(Protocol::Sb);

    assert_eq!(
        router.set_route(VirtualOutput::Tv1, VirtualInput::Hdmi3).wait().await,
        Ok(())
    );
    wait_for_virtual(&router, VirtualOutput::Lcd1, Some(VirtualInput::Hdmi3)).await;

    // The CRT half still shows an analog source
    assert_eq!(router.virtual_state()[VirtualOutput::Tv1.index()], None);
    assert_eq!(comp_sim.outputs(), vec![0; 8]);
}

#[tokio::test(start_paused = true)]
async fn test_crt_route_sends_no_hdmi_command() {
    let (router, hdmi_sim, comp_sim) = simulated_router(Protocol::Sb);
    let hdmi_before = hdmi_sim.outputs();

    assert_eq!(
        router.set_route(VirtualOutput::Crt2, VirtualInput::Comp1).wait().await,
        Ok(())
    );
    wait_for_virtual(&router, VirtualOutput::Crt2, Some(VirtualInput::Comp1)).await;

    assert_eq!(hdmi_sim.outputs(), hdmi_before);
    // OSSC_1 <- COMP_1 and CRT_2 <- COMP_1
    assert_eq!(comp_sim.outputs()[0], 7);
    assert_eq!(comp_sim.outputs()[5], 7);
}

#[tokio::test(start_paused = true)]
async fn test_raw_route_rejects_bad_arguments() {
    let (router, hdmi_sim, _comp_sim) = simulated_router(Protocol::Extron);

    assert!(router.set_route_raw("-1", "0").is_err());
    assert!(router.set_route_raw("0", "12").is_err());
    assert!(router.set_route_raw("zero", "0").is_err());

    let tickets = router.set_route_raw("3", "4").unwrap();
    assert_eq!(tickets.wait().await, Ok(()));
    // STREAM_4 <- OSSC_1 (fed by COMP_1)
    assert_eq!(hdmi_sim.outputs()[3], 0);
}

// ============================================================================
// Property Tests
// ============================================================================

mod proptest_tests {
    use av_mux::{compute_virtual_state, RoutePlan, VirtualInput, VirtualOutput};
    use proptest::prelude::*;

    fn apply(plan: &RoutePlan, hdmi: &mut [u8], component: &mut [u8]) {
        if let (Some(output), input) = plan.hdmi {
            hdmi[usize::from(output.port())] = input.port();
        }
        for (output, input) in &plan.component {
            component[usize::from(output.port())] = input.port();
        }
    }

    proptest! {
        #[test]
        fn prop_route_takes_effect_from_any_state(
            output in 0..VirtualOutput::ALL.len(),
            input in 0..VirtualInput::ALL.len(),
            mut hdmi in prop::collection::vec(0u8..8, 8),
            mut component in prop::collection::vec(0u8..8, 8),
        ) {
            let output = VirtualOutput::ALL[output];
            let input = VirtualInput::ALL[input];

            let plan = RoutePlan::new(output, input);
            apply(&plan, &mut hdmi, &mut component);
            let state = compute_virtual_state(&hdmi, &component);

            if input.is_hdmi() && output.has_crt() {
                // A CRT can only ever show an analog source
                prop_assert_ne!(state[output.index()], Some(input));
                if virtual_tv(output) {
                    prop_assert_eq!(state[output.index()], None);
                }
            } else {
                prop_assert_eq!(state[output.index()], Some(input));
            }
        }

        #[test]
        fn prop_plan_size(
            output in 0..VirtualOutput::ALL.len(),
            input in 0..VirtualInput::ALL.len(),
        ) {
            let output = VirtualOutput::ALL[output];
            let input = VirtualInput::ALL[input];
            let plan = RoutePlan::new(output, input);

            let expected_component = match (input.is_hdmi(), output.has_crt()) {
                (true, _) => 0,
                (false, false) => 1,
                (false, true) => 2,
            };
            prop_assert_eq!(plan.component.len(), expected_component);
            prop_assert_eq!(plan.hdmi.0.is_none(), output.has_crt() && !virtual_tv(output));
        }
    }

    fn virtual_tv(output: VirtualOutput) -> bool {
        matches!(
            output,
            VirtualOutput::Tv1 | VirtualOutput::Tv2 | VirtualOutput::Tv3 | VirtualOutput::Tv4
        )
    }
}
