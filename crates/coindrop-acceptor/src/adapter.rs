//! Coin acceptor adapter: mechanical operations over the device channel.
//!
//! The adapter is a thin domain facade. It knows which control function each
//! mechanical operation maps to and nothing about pulse semantics. Command
//! failures are expected at runtime (device unplugged, driver busy): they are
//! logged and reported as `false`, never propagated as errors, so a flaky
//! solenoid cannot take the whole service down.

use coindrop_channel::{
    AnyDeviceChannel, ChangeRecord, DeviceBus, DeviceChannel, DeviceDescriptor, DeviceFunction,
    ReadOutcome,
};
use coindrop_core::{Error, Result};
use tracing::{debug, info, warn};

/// Domain facade over one opened coin acceptor device channel.
pub struct CoinAcceptorAdapter {
    descriptor: DeviceDescriptor,
    channel: Option<AnyDeviceChannel>,
}

impl CoinAcceptorAdapter {
    /// Create an adapter for the given device descriptor. No device I/O
    /// happens until [`initialize`](Self::initialize).
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            channel: None,
        }
    }

    /// The descriptor this adapter was built with.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// True once a channel has been opened and not yet cleaned up.
    pub fn is_initialized(&self) -> bool {
        self.channel.is_some()
    }

    /// Discover the device interface and open the channel.
    ///
    /// # Errors
    ///
    /// Returns the discovery or open error. The adapter stays unusable; the
    /// caller decides whether that is fatal (initialization) or transient.
    pub async fn initialize(&mut self, bus: &impl DeviceBus) -> Result<()> {
        let path = bus.discover(self.descriptor.interface_id).inspect_err(|e| {
            warn!(interface = %self.descriptor.interface_id, error = %e, "device discovery failed");
        })?;
        let channel = bus.open(&path, self.descriptor.mode).await.inspect_err(|e| {
            warn!(%path, error = %e, "device open failed");
        })?;
        info!(%path, mode = ?self.descriptor.mode, "coin acceptor channel opened");
        self.channel = Some(channel);
        Ok(())
    }

    /// Read the next change record.
    ///
    /// Returns `Ok(None)` when the device had nothing to report within the
    /// wait period (overlapped mode); that is the normal idle case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`initialize`](Self::initialize),
    /// or the channel's read error if the device failed.
    pub async fn read(&mut self) -> Result<Option<ChangeRecord>> {
        let channel = self.channel.as_mut().ok_or(Error::NotInitialized)?;
        match channel.read_record().await? {
            ReadOutcome::Record(record) => Ok(Some(record)),
            ReadOutcome::Pending => Ok(None),
        }
    }

    /// Acknowledge a consumed record to the device.
    ///
    /// Device classes without a persistent record queue do not require
    /// acknowledgement and report success unconditionally.
    pub async fn ack_read(&mut self, change_id: u32) -> bool {
        if !self.descriptor.requires_ack {
            return true;
        }
        self.command_with_payload(DeviceFunction::Acknowledge, &change_id.to_le_bytes())
            .await
    }

    /// Energize (`true`) or release (`false`) the reject mechanism.
    pub async fn reject_mechanism(&mut self, on: bool) -> bool {
        let function = if on {
            DeviceFunction::RejectOn
        } else {
            DeviceFunction::RejectOff
        };
        self.command(function).await
    }

    /// Energize (`true`, route to hopper) or release (`false`, route to
    /// cashbox) the diverter solenoid.
    pub async fn diverter_mechanism(&mut self, on: bool) -> bool {
        let function = if on {
            DeviceFunction::DiverterOn
        } else {
            DeviceFunction::DiverterOff
        };
        self.command(function).await
    }

    /// Start the device's internal sensor polling.
    pub async fn start_polling(&mut self) -> bool {
        self.command(DeviceFunction::StartPolling).await
    }

    /// Stop the device's internal sensor polling.
    pub async fn stop_polling(&mut self) -> bool {
        self.command(DeviceFunction::StopPolling).await
    }

    /// Close the channel. Safe to call multiple times.
    pub async fn cleanup(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            debug!("coin acceptor channel closed");
        }
    }

    async fn command(&mut self, function: DeviceFunction) -> bool {
        self.command_with_payload(function, &[]).await
    }

    async fn command_with_payload(&mut self, function: DeviceFunction, payload: &[u8]) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            warn!(%function, "control request on uninitialized adapter");
            return false;
        };
        match channel.control(function, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%function, error = %e, "control request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coindrop_channel::mock::MockBus;

    async fn initialized(
        descriptor: DeviceDescriptor,
    ) -> (CoinAcceptorAdapter, coindrop_channel::mock::MockDeviceHandle) {
        let bus = MockBus::new();
        let handle = bus.install(&descriptor);
        let mut adapter = CoinAcceptorAdapter::new(descriptor);
        adapter.initialize(&bus).await.unwrap();
        (adapter, handle)
    }

    #[tokio::test]
    async fn test_initialize_missing_device() {
        let bus = MockBus::new();
        let mut adapter = CoinAcceptorAdapter::new(DeviceDescriptor::standard());
        let err = adapter.initialize(&bus).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert!(!adapter.is_initialized());
    }

    #[tokio::test]
    async fn test_read_before_initialize() {
        let mut adapter = CoinAcceptorAdapter::new(DeviceDescriptor::standard());
        let err = adapter.read().await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn test_read_idle_returns_none() {
        let descriptor = DeviceDescriptor::standard().with_wait_period_ms(10);
        let (mut adapter, _handle) = initialized(descriptor).await;
        assert_eq!(adapter.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_returns_pushed_record() {
        let descriptor = DeviceDescriptor::standard().with_wait_period_ms(10);
        let (mut adapter, handle) = initialized(descriptor).await;

        let record = ChangeRecord::new(3, 0x0F, 1_000);
        handle.push_record(record).await.unwrap();
        assert_eq!(adapter.read().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_ack_without_requirement_issues_nothing() {
        let (mut adapter, handle) = initialized(DeviceDescriptor::standard()).await;
        assert!(adapter.ack_read(7).await);
        assert!(handle.controls().is_empty());
    }

    #[tokio::test]
    async fn test_ack_with_requirement_sends_change_id() {
        let (mut adapter, handle) = initialized(DeviceDescriptor::non_volatile()).await;
        assert!(adapter.ack_read(7).await);
        assert_eq!(handle.acked_ids(), vec![7]);
    }

    #[tokio::test]
    async fn test_mechanism_commands() {
        let (mut adapter, handle) = initialized(DeviceDescriptor::standard()).await;

        assert!(adapter.reject_mechanism(true).await);
        assert!(handle.reject_engaged());
        assert!(adapter.reject_mechanism(false).await);
        assert!(!handle.reject_engaged());

        assert!(adapter.diverter_mechanism(true).await);
        assert!(handle.diverter_engaged());

        assert!(adapter.start_polling().await);
        assert!(handle.is_polling());
        assert!(adapter.stop_polling().await);
        assert!(!handle.is_polling());
    }

    #[tokio::test]
    async fn test_command_failure_returns_false() {
        let (mut adapter, handle) = initialized(DeviceDescriptor::standard()).await;
        handle.fail_controls(true);
        assert!(!adapter.reject_mechanism(true).await);
        assert!(!adapter.start_polling().await);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (mut adapter, _handle) = initialized(DeviceDescriptor::standard()).await;
        adapter.cleanup().await;
        assert!(!adapter.is_initialized());
        adapter.cleanup().await;

        // Commands after cleanup fail quietly.
        assert!(!adapter.reject_mechanism(true).await);
    }
}
