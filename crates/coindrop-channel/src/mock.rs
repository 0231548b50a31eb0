//! Mock device bus and channel for testing and development.
//!
//! The mock simulates the kernel-mode coin acceptor: records are queued
//! programmatically through a [`MockDeviceHandle`] and consumed through the
//! normal [`DeviceChannel`] interface, while every control request is
//! recorded so tests can assert exactly which mechanism commands the engine
//! issued.

use crate::descriptor::{ChannelMode, DeviceDescriptor};
use crate::devices::AnyDeviceChannel;
use crate::ioctl::DeviceFunction;
use crate::record::ChangeRecord;
use crate::traits::{DeviceBus, DeviceChannel, ReadOutcome};
use bytes::{BufMut, Bytes, BytesMut};
use coindrop_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Observable state of one mock device, shared between channel and handle.
#[derive(Debug, Default)]
struct MockDeviceState {
    /// Every control function issued, in order.
    controls: Vec<DeviceFunction>,

    /// Change ids acknowledged via [`DeviceFunction::Acknowledge`].
    acked: Vec<u32>,

    /// Device-internal sensor polling running.
    polling: bool,

    /// Reject mechanism energized.
    reject_on: bool,

    /// Diverter solenoid energized (hopper position).
    diverter_on: bool,

    /// When set, every control request fails.
    fail_controls: bool,

    /// Records pushed but not yet consumed.
    record_count: u32,

    /// Value mask of the most recently pushed record.
    last_value: u32,

    /// Read attempts made on the channel.
    polling_count: u32,
}

/// Mock channel to one simulated coin acceptor device.
///
/// Created by [`MockBus::install`] and handed out by [`MockBus::open`];
/// records arrive from the paired [`MockDeviceHandle`].
#[derive(Debug)]
pub struct MockChannel {
    mode: ChannelMode,
    wait_period: Duration,
    record_rx: tokio::sync::mpsc::Receiver<ChangeRecord>,
    state: Arc<Mutex<MockDeviceState>>,
    closed: bool,
}

impl MockChannel {
    fn new(
        mode: ChannelMode,
        wait_period: Duration,
    ) -> (Self, tokio::sync::mpsc::Sender<ChangeRecord>, Arc<Mutex<MockDeviceState>>) {
        let (record_tx, record_rx) = tokio::sync::mpsc::channel(64);
        let state = Arc::new(Mutex::new(MockDeviceState::default()));
        let channel = Self {
            mode,
            wait_period,
            record_rx,
            state: Arc::clone(&state),
            closed: false,
        };
        (channel, record_tx, state)
    }

    fn consume(&self, record: ChangeRecord) -> ReadOutcome {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.record_count = state.record_count.saturating_sub(1);
        ReadOutcome::Record(record)
    }
}

impl DeviceChannel for MockChannel {
    async fn read_record(&mut self) -> Result<ReadOutcome> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        self.state.lock().expect("mock state poisoned").polling_count += 1;

        match self.mode {
            ChannelMode::Synchronous => {
                let next = self.record_rx.recv().await;
                match next {
                    Some(record) => Ok(self.consume(record)),
                    None => Err(Error::ChannelClosed),
                }
            }
            ChannelMode::Overlapped => {
                let next = tokio::time::timeout(self.wait_period, self.record_rx.recv()).await;
                match next {
                    Ok(Some(record)) => Ok(self.consume(record)),
                    Ok(None) => Err(Error::ChannelClosed),
                    // Wait period elapsed with no device activity.
                    Err(_) => Ok(ReadOutcome::Pending),
                }
            }
        }
    }

    async fn control(&mut self, function: DeviceFunction, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        let mut state = self.state.lock().expect("mock state poisoned");
        if state.fail_controls {
            return Err(Error::control_failed(function.to_string(), "injected failure"));
        }
        tracing::debug!(%function, "mock control request");
        state.controls.push(function);
        match function {
            DeviceFunction::RejectOn => state.reject_on = true,
            DeviceFunction::RejectOff => state.reject_on = false,
            DeviceFunction::DiverterOn => state.diverter_on = true,
            DeviceFunction::DiverterOff => state.diverter_on = false,
            DeviceFunction::StartPolling => state.polling = true,
            DeviceFunction::StopPolling => state.polling = false,
            DeviceFunction::Acknowledge => {
                let id: [u8; 4] = payload.try_into().map_err(|_| {
                    Error::control_failed(function.to_string(), "acknowledge payload must be 4 bytes")
                })?;
                state.acked.push(u32::from_le_bytes(id));
            }
            _ => {}
        }
        Ok(())
    }

    async fn control_with_response(
        &mut self,
        function: DeviceFunction,
        _payload: &[u8],
    ) -> Result<Bytes> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        let mut state = self.state.lock().expect("mock state poisoned");
        if state.fail_controls {
            return Err(Error::control_failed(function.to_string(), "injected failure"));
        }
        state.controls.push(function);
        let mut buf = BytesMut::with_capacity(4);
        match function {
            DeviceFunction::RecordCount => buf.put_u32_le(state.record_count),
            DeviceFunction::PollingCount => buf.put_u32_le(state.polling_count),
            DeviceFunction::RegisterValue => buf.put_u32_le(state.last_value),
            _ => return Err(Error::UnsupportedFunction(function.to_string())),
        }
        Ok(buf.freeze())
    }

    async fn close(&mut self) {
        // Idempotent; the receiver is simply no longer serviced.
        self.closed = true;
    }
}

/// Handle for driving a mock device from tests.
///
/// Cloneable; all clones observe the same device state.
#[derive(Debug, Clone)]
pub struct MockDeviceHandle {
    record_tx: tokio::sync::mpsc::Sender<ChangeRecord>,
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDeviceHandle {
    /// Queue a change record for the channel to read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the channel side was dropped.
    pub async fn push_record(&self, record: ChangeRecord) -> Result<()> {
        {
            let mut state = self.state.lock().expect("mock state poisoned");
            state.record_count += 1;
            state.last_value = record.new_value;
        }
        self.record_tx
            .send(record)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Control functions issued so far, in order.
    pub fn controls(&self) -> Vec<DeviceFunction> {
        self.state.lock().expect("mock state poisoned").controls.clone()
    }

    /// Change ids acknowledged so far.
    pub fn acked_ids(&self) -> Vec<u32> {
        self.state.lock().expect("mock state poisoned").acked.clone()
    }

    /// Whether the device's internal polling is running.
    pub fn is_polling(&self) -> bool {
        self.state.lock().expect("mock state poisoned").polling
    }

    /// Whether the reject mechanism is energized.
    pub fn reject_engaged(&self) -> bool {
        self.state.lock().expect("mock state poisoned").reject_on
    }

    /// Whether the diverter solenoid is energized (hopper position).
    pub fn diverter_engaged(&self) -> bool {
        self.state.lock().expect("mock state poisoned").diverter_on
    }

    /// Make every subsequent control request fail (or succeed again).
    pub fn fail_controls(&self, fail: bool) {
        self.state.lock().expect("mock state poisoned").fail_controls = fail;
    }

    /// Records pushed but not yet consumed.
    pub fn record_count(&self) -> u32 {
        self.state.lock().expect("mock state poisoned").record_count
    }
}

/// One installed device on the mock bus.
#[derive(Debug)]
struct MockSlot {
    path: String,
    channel: Option<MockChannel>,
}

/// Mock device bus.
///
/// Install one simulated device per interface GUID, then let the engine
/// discover and open it exactly as it would a real device interface.
///
/// # Examples
///
/// ```
/// use coindrop_channel::mock::MockBus;
/// use coindrop_channel::{ChangeRecord, DeviceBus, DeviceDescriptor};
///
/// # #[tokio::main]
/// # async fn main() -> coindrop_core::Result<()> {
/// let bus = MockBus::new();
/// let descriptor = DeviceDescriptor::standard();
/// let handle = bus.install(&descriptor);
///
/// let path = bus.discover(descriptor.interface_id)?;
/// let _channel = bus.open(&path, descriptor.mode).await?;
///
/// handle.push_record(ChangeRecord::new(1, 0x01, 2_000)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockBus {
    devices: Mutex<HashMap<Uuid, MockSlot>>,
}

impl MockBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a simulated device for the descriptor's interface.
    ///
    /// Returns the handle used to push records and inspect device state.
    /// Installing again for the same interface replaces the previous device.
    pub fn install(&self, descriptor: &DeviceDescriptor) -> MockDeviceHandle {
        let (channel, record_tx, state) = MockChannel::new(
            descriptor.mode,
            Duration::from_millis(descriptor.wait_period_ms),
        );
        let path = format!("mock://{}", descriptor.interface_id);
        self.devices.lock().expect("mock bus poisoned").insert(
            descriptor.interface_id,
            MockSlot {
                path,
                channel: Some(channel),
            },
        );
        MockDeviceHandle { record_tx, state }
    }
}

impl DeviceBus for MockBus {
    fn discover(&self, interface_id: Uuid) -> Result<String> {
        self.devices
            .lock()
            .expect("mock bus poisoned")
            .get(&interface_id)
            .map(|slot| slot.path.clone())
            .ok_or_else(|| Error::DeviceNotFound(interface_id.to_string()))
    }

    async fn open(&self, path: &str, mode: ChannelMode) -> Result<AnyDeviceChannel> {
        let mut devices = self.devices.lock().expect("mock bus poisoned");
        let slot = devices
            .values_mut()
            .find(|slot| slot.path == path)
            .ok_or_else(|| Error::OpenFailed {
                path: path.to_string(),
                message: "no such device".to_string(),
            })?;
        let mut channel = slot.channel.take().ok_or_else(|| Error::OpenFailed {
            path: path.to_string(),
            message: "device already opened".to_string(),
        })?;
        channel.mode = mode;
        Ok(AnyDeviceChannel::Mock(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coindrop_core::constants::SENSE_LINE;

    fn overlapped_descriptor() -> DeviceDescriptor {
        DeviceDescriptor::standard().with_wait_period_ms(20)
    }

    #[tokio::test]
    async fn test_discover_and_open() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let _handle = bus.install(&descriptor);

        let path = bus.discover(descriptor.interface_id).unwrap();
        assert!(path.starts_with("mock://"));
        bus.open(&path, descriptor.mode).await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_missing_interface() {
        let bus = MockBus::new();
        let err = bus.discover(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_double_open_fails() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let _handle = bus.install(&descriptor);

        let path = bus.discover(descriptor.interface_id).unwrap();
        bus.open(&path, descriptor.mode).await.unwrap();
        let err = bus.open(&path, descriptor.mode).await.unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
    }

    #[tokio::test]
    async fn test_push_and_read_record() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        let record = ChangeRecord::new(1, SENSE_LINE, 2_000);
        handle.push_record(record).await.unwrap();
        assert_eq!(handle.record_count(), 1);

        let outcome = channel.read_record().await.unwrap();
        assert_eq!(outcome, ReadOutcome::Record(record));
        assert_eq!(handle.record_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapped_read_times_out_as_pending() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let _handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, ChannelMode::Overlapped).await.unwrap();

        let outcome = channel.read_record().await.unwrap();
        assert_eq!(outcome, ReadOutcome::Pending);
    }

    #[tokio::test]
    async fn test_controls_are_recorded() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        channel.control(DeviceFunction::RejectOn, &[]).await.unwrap();
        channel.control(DeviceFunction::DiverterOn, &[]).await.unwrap();
        channel.control(DeviceFunction::StartPolling, &[]).await.unwrap();

        assert!(handle.reject_engaged());
        assert!(handle.diverter_engaged());
        assert!(handle.is_polling());
        assert_eq!(
            handle.controls(),
            vec![
                DeviceFunction::RejectOn,
                DeviceFunction::DiverterOn,
                DeviceFunction::StartPolling,
            ]
        );
    }

    #[tokio::test]
    async fn test_acknowledge_records_change_id() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        channel
            .control(DeviceFunction::Acknowledge, &42u32.to_le_bytes())
            .await
            .unwrap();
        assert_eq!(handle.acked_ids(), vec![42]);
    }

    #[tokio::test]
    async fn test_acknowledge_rejects_bad_payload() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let _handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        let err = channel
            .control(DeviceFunction::Acknowledge, &[1, 2])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ControlFailed { .. }));
    }

    #[tokio::test]
    async fn test_injected_control_failure() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        handle.fail_controls(true);
        let err = channel.control(DeviceFunction::RejectOn, &[]).await.unwrap_err();
        assert!(matches!(err, Error::ControlFailed { .. }));
        assert!(handle.controls().is_empty());

        handle.fail_controls(false);
        channel.control(DeviceFunction::RejectOn, &[]).await.unwrap();
        assert!(handle.reject_engaged());
    }

    #[tokio::test]
    async fn test_record_count_response() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        handle.push_record(ChangeRecord::new(1, 0, 100)).await.unwrap();
        handle.push_record(ChangeRecord::new(2, 0, 100)).await.unwrap();

        let response = channel
            .control_with_response(DeviceFunction::RecordCount, &[])
            .await
            .unwrap();
        assert_eq!(response.as_ref(), &2u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_terminal() {
        let bus = MockBus::new();
        let descriptor = overlapped_descriptor();
        let _handle = bus.install(&descriptor);
        let path = bus.discover(descriptor.interface_id).unwrap();
        let mut channel = bus.open(&path, descriptor.mode).await.unwrap();

        channel.close().await;
        channel.close().await;

        let err = channel.read_record().await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        let err = channel.control(DeviceFunction::RejectOn, &[]).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }
}
