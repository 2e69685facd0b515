use crossbeam_channel::{bounded, RecvTimeoutError};

use super::{control_error, StreamDeviceManager};
use crate::card::DeviceState;
use crate::driver::{Control, DeviceNode, Query};
use crate::error::{AudioError, AudioResult, DriverError};
use crate::process::{ProcessSubtype, ProcessType, SpeechEvent};

/// Events a detector may queue before the driver starts dropping them.
const EVENT_QUEUE_DEPTH: usize = 16;

impl StreamDeviceManager {
    /// Select the detector type a capture device runs.
    pub fn register_process_type(
        &self,
        card: usize,
        device: usize,
        kind: ProcessType,
        subtype: ProcessSubtype,
    ) -> AudioResult<()> {
        self.with_process_device(card, device, |dev, node| {
            self.driver
                .control(node, Control::ProcessType(kind, subtype))
                .map_err(control_error)?;
            dev.process.kind = kind;
            dev.process.subtype = subtype;
            Ok(())
        })
    }

    /// Attach an event handler to a capture device. Further registrations
    /// share the first one's channel.
    pub fn register_process_handler(&self, card: usize, device: usize, kind: ProcessType) -> AudioResult<()> {
        self.with_process_device(card, device, |dev, node| {
            let slot = &mut dev.process;
            if slot.has_handler() {
                if slot.kind != kind {
                    return Err(AudioError::AlreadyInUse);
                }
                slot.refs += 1;
                tracing::debug!(%node, refs = slot.refs, "process handler shared");
                return Ok(());
            }

            let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
            self.driver.register_process(node, tx).map_err(|err| match err {
                DriverError::Busy => AudioError::AlreadyInUse,
                DriverError::InvalidArgument | DriverError::NotImplemented => AudioError::DeviceNotSupported,
                other => control_error(other),
            })?;
            slot.kind = kind;
            slot.refs = 1;
            slot.events = Some(rx);
            tracing::info!(%node, ?kind, "process handler registered");
            Ok(())
        })
    }

    /// Drop one handler registration; the last one detaches from the driver.
    pub fn unregister_process(&self, card: usize, device: usize) -> AudioResult<()> {
        self.with_process_device(card, device, |dev, node| {
            if !dev.process.has_handler() {
                return Err(AudioError::InvalidDevice);
            }
            if dev.process.release() {
                if let Err(err) = self.driver.unregister_process(node) {
                    tracing::warn!(?err, %node, "driver kept process registration");
                }
                tracing::info!(%node, "process handler unregistered");
            }
            Ok(())
        })
    }

    pub fn start_process(&self, card: usize, device: usize, subtype: ProcessSubtype) -> AudioResult<()> {
        if subtype == ProcessSubtype::None {
            return Err(AudioError::InvalidParam);
        }
        self.with_process_device(card, device, |dev, node| {
            if subtype.needs_handler() && !dev.process.has_handler() {
                return Err(AudioError::InvalidDevice);
            }
            self.driver
                .control(node, Control::ProcessStart(subtype))
                .map_err(control_error)?;
            dev.process.subtype = subtype;
            Ok(())
        })
    }

    /// Stop a detector and discard whatever it queued.
    pub fn stop_process(&self, card: usize, device: usize, subtype: ProcessSubtype) -> AudioResult<()> {
        self.with_process_device(card, device, |dev, node| {
            self.driver
                .control(node, Control::ProcessStop(subtype))
                .map_err(control_error)?;
            let dropped = dev.process.drain_events();
            if dropped > 0 {
                tracing::debug!(%node, dropped, "queued speech events discarded");
            }
            if dev.process.subtype == subtype {
                dev.process.subtype = ProcessSubtype::None;
            }
            Ok(())
        })
    }

    /// Wait up to the configured timeout for the next detector event.
    pub fn process_message(&self, card: usize, device: usize) -> AudioResult<SpeechEvent> {
        let events = self.with_process_device(card, device, |dev, _| {
            if !dev.process.has_handler() {
                return Err(AudioError::InvalidDevice);
            }
            dev.process.events.clone().ok_or(AudioError::InvalidDevice)
        })?;

        match events.recv_timeout(self.config.process_timeout()) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(AudioError::Again),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::InvalidDevice),
        }
    }

    /// First capture device registered for `kind` and `subtype`, as
    /// `(card, device)`.
    pub fn find_stream_in_device_with_process_type(
        &self,
        kind: ProcessType,
        subtype: ProcessSubtype,
    ) -> AudioResult<(usize, usize)> {
        self.input_cards
            .iter()
            .enumerate()
            .find_map(|(card_id, card)| {
                let card = card.lock();
                let device = card.devices.iter().enumerate().position(|(idx, dev)| {
                    card.is_discovered(idx) && dev.process.kind == kind && dev.process.subtype == subtype
                });
                device.map(|device| (card_id, device))
            })
            .ok_or(AudioError::DeviceNotSupported)
    }

    pub fn keyword_buffer_size(&self, card: usize, device: usize) -> AudioResult<usize> {
        self.with_process_device(card, device, |_, node| {
            self.driver
                .query(node, Query::KeywordBufferSize)
                .map(|size| size as usize)
                .map_err(control_error)
        })
    }

    /// Copy the audio captured around the last keyword into `buf`.
    pub fn keyword_data(&self, card: usize, device: usize, buf: &mut [u8]) -> AudioResult<usize> {
        if buf.is_empty() {
            return Err(AudioError::InvalidParam);
        }
        self.with_process_device(card, device, |_, node| {
            self.driver.keyword_data(node, buf).map_err(control_error)
        })
    }

    pub fn keyword_sensitivity(&self, card: usize, device: usize) -> AudioResult<u32> {
        self.with_process_device(card, device, |_, node| {
            self.driver
                .query(node, Query::KeywordSensitivity)
                .map_err(control_error)
        })
    }

    pub fn set_keyword_sensitivity(&self, card: usize, device: usize, sensitivity: u32) -> AudioResult<()> {
        self.with_process_device(card, device, |_, node| {
            self.driver
                .control(node, Control::KeywordSensitivity(sensitivity))
                .map_err(control_error)
        })
    }

    fn with_process_device<R>(
        &self,
        card: usize,
        device: usize,
        f: impl FnOnce(&mut DeviceState, DeviceNode) -> AudioResult<R>,
    ) -> AudioResult<R> {
        if card >= self.input_cards.len() || device >= self.config.max_devices_per_card {
            return Err(AudioError::InvalidParam);
        }
        let mut guard = self.input_cards[card].lock();
        if !guard.is_discovered(device) {
            return Err(AudioError::InvalidDevice);
        }
        let node = guard.node_for(device);
        f(&mut guard.devices[device], node)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fixture, fixture_with};
    use super::*;
    use crate::format::Direction;
    use crate::virtual_driver::{FaultPoint, VirtualDevice, VirtualDriver};

    const IN: DeviceNode = DeviceNode::new(0, 0, Direction::Input);

    #[test]
    fn handlers_are_reference_counted() {
        let fx = fixture();
        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();
        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();

        fx.manager.unregister_process(0, 0).unwrap();
        assert!(fx.driver.emit_event(IN, SpeechEvent::KeywordDetected));
        assert_eq!(fx.manager.process_message(0, 0), Ok(SpeechEvent::KeywordDetected));

        fx.manager.unregister_process(0, 0).unwrap();
        assert!(!fx.driver.emit_event(IN, SpeechEvent::KeywordDetected));
        assert_eq!(fx.manager.unregister_process(0, 0), Err(AudioError::InvalidDevice));
        assert_eq!(fx.manager.process_message(0, 0), Err(AudioError::InvalidDevice));
    }

    #[test]
    fn message_times_out_with_again() {
        let fx = fixture();
        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();
        assert_eq!(fx.manager.process_message(0, 0), Err(AudioError::Again));

        fx.driver.emit_event(IN, SpeechEvent::LocalCommand(3));
        assert_eq!(fx.manager.process_message(0, 0), Ok(SpeechEvent::LocalCommand(3)));
    }

    #[test]
    fn driver_refusals_are_mapped() {
        let fx = fixture();
        fx.driver.inject_fault(FaultPoint::RegisterProcess, DriverError::Busy);
        assert_eq!(
            fx.manager.register_process_handler(0, 0, ProcessType::SpeechDetector),
            Err(AudioError::AlreadyInUse)
        );
        fx.driver
            .inject_fault(FaultPoint::RegisterProcess, DriverError::InvalidArgument);
        assert_eq!(
            fx.manager.register_process_handler(0, 0, ProcessType::SpeechDetector),
            Err(AudioError::DeviceNotSupported)
        );
        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();
    }

    #[test]
    fn addressing_is_checked() {
        let fx = fixture();
        assert_eq!(
            fx.manager
                .register_process_type(5, 0, ProcessType::SpeechDetector, ProcessSubtype::KeywordDetect),
            Err(AudioError::InvalidParam)
        );
        assert_eq!(
            fx.manager
                .register_process_type(1, 0, ProcessType::SpeechDetector, ProcessSubtype::KeywordDetect),
            Err(AudioError::InvalidDevice)
        );
        assert_eq!(fx.manager.keyword_sensitivity(0, 7), Err(AudioError::InvalidParam));
    }

    #[test]
    fn start_needs_a_handler_except_for_echo_cancellation() {
        let fx = fixture();
        assert_eq!(
            fx.manager.start_process(0, 0, ProcessSubtype::KeywordDetect),
            Err(AudioError::InvalidDevice)
        );
        fx.manager.start_process(0, 0, ProcessSubtype::Aec).unwrap();
        assert_eq!(
            fx.manager.start_process(0, 0, ProcessSubtype::None),
            Err(AudioError::InvalidParam)
        );

        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();
        fx.manager
            .start_process(0, 0, ProcessSubtype::KeywordDetect)
            .unwrap();
        assert!(fx
            .driver
            .controls(IN)
            .contains(&Control::ProcessStart(ProcessSubtype::KeywordDetect)));
    }

    #[test]
    fn stop_discards_queued_events() {
        let fx = fixture();
        fx.manager
            .register_process_handler(0, 0, ProcessType::SpeechDetector)
            .unwrap();
        fx.manager
            .start_process(0, 0, ProcessSubtype::SpeechDetect)
            .unwrap();
        fx.driver.emit_event(IN, SpeechEvent::SpeechDetected);
        fx.driver.emit_event(IN, SpeechEvent::EndPointDetected);

        fx.manager
            .stop_process(0, 0, ProcessSubtype::SpeechDetect)
            .unwrap();
        assert_eq!(fx.manager.process_message(0, 0), Err(AudioError::Again));
    }

    #[test]
    fn registered_type_is_found() {
        let fx = fixture();
        assert_eq!(
            fx.manager
                .find_stream_in_device_with_process_type(ProcessType::SpeechDetector, ProcessSubtype::KeywordDetect),
            Err(AudioError::DeviceNotSupported)
        );
        fx.manager
            .register_process_type(0, 0, ProcessType::SpeechDetector, ProcessSubtype::KeywordDetect)
            .unwrap();
        assert_eq!(
            fx.manager
                .find_stream_in_device_with_process_type(ProcessType::SpeechDetector, ProcessSubtype::KeywordDetect),
            Ok((0, 0))
        );
        assert_eq!(
            fx.manager
                .find_stream_in_device_with_process_type(ProcessType::SpeechDetector, ProcessSubtype::Local),
            Err(AudioError::DeviceNotSupported)
        );
    }

    #[test]
    fn keyword_buffer_and_sensitivity() {
        let fx = fixture_with(
            VirtualDriver::new().with_device(IN, VirtualDevice::new(1, &[16_000]).keyword(vec![1, 2, 3, 4])),
        );
        assert_eq!(fx.manager.keyword_buffer_size(0, 0), Ok(4));

        let mut buf = [0u8; 8];
        assert_eq!(fx.manager.keyword_data(0, 0, &mut buf), Ok(4));
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(fx.manager.keyword_data(0, 0, &mut []), Err(AudioError::InvalidParam));

        fx.manager.set_keyword_sensitivity(0, 0, 3).unwrap();
        assert_eq!(fx.manager.keyword_sensitivity(0, 0), Ok(3));
    }
}
