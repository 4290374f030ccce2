//! Gravity estimator
//!
//! A derived VSensor publishing the gravity vector, obtained by low-pass
//! filtering the accelerometer. It subscribes to the accelerometer VSensor
//! through a RIR smart listener, so its own report interval drives the
//! accelerometer's and faster accelerometer output is decimated down to it.
//!
//! The filter is a first-order low-pass with time constant `tau`:
//!
//! ```text
//! alpha = dt / (tau + dt)
//! g[n]  = g[n-1] + alpha * (a[n] - g[n-1])
//! ```

use alloc::rc::Rc;
use core::cell::RefCell;

use imu_sdk_core::vsensor::{
    handler_fn, ListenerEvent, ListenerHandler, ListenerId, Result, SensorData, SensorType,
    VSensorAttr, VSensorError, VSensorEvent, VSensorHub, VSensorId, VSensorProducer,
};
use nalgebra::Vector3;

use crate::devices::imu::vsensor::VECTOR_PAYLOAD_SIZE;

/// Default filter time constant (0.5 s)
pub const DEFAULT_TIME_CONSTANT_US: f32 = 500_000.0;

#[derive(Debug, Default)]
struct GravityState {
    listener: Option<ListenerId>,
    estimate: Option<Vector3<f32>>,
    last_timestamp_us: u64,
    last: Option<SensorData>,
}

impl GravityState {
    fn filter(
        &mut self,
        accel: Vector3<f32>,
        timestamp_us: u64,
        accuracy: u8,
        time_constant_us: f32,
    ) -> SensorData {
        let gravity = match self.estimate {
            Some(previous) if timestamp_us > self.last_timestamp_us => {
                let dt = (timestamp_us - self.last_timestamp_us) as f32;
                let alpha = dt / (time_constant_us + dt);
                previous + (accel - previous) * alpha
            }
            Some(previous) => previous,
            None => accel,
        };

        self.estimate = Some(gravity);
        self.last_timestamp_us = timestamp_us;

        let sample = SensorData::Vector {
            timestamp_us,
            value: gravity,
            accuracy,
        };
        self.last = Some(sample);
        sample
    }
}

/// Gravity VSensor producer
pub struct GravitySensor {
    accel: VSensorId,
    time_constant_us: f32,
    state: Rc<RefCell<GravityState>>,
}

impl GravitySensor {
    pub fn new(accel: VSensorId, time_constant_us: f32) -> Self {
        Self {
            accel,
            time_constant_us,
            state: Rc::new(RefCell::new(GravityState::default())),
        }
    }

    /// Register a gravity VSensor fed by the accelerometer VSensor `accel`
    pub fn register(
        hub: &mut VSensorHub,
        accel: VSensorId,
        time_constant_us: f32,
    ) -> Result<VSensorId> {
        let producer = Rc::new(Self::new(accel, time_constant_us));
        hub.register_vsensor(
            producer,
            SensorType::Gravity,
            VECTOR_PAYLOAD_SIZE,
            Some(VSensorAttr::default()),
        )
    }

    fn listener(&self) -> Option<ListenerId> {
        self.state.borrow().listener
    }

    /// Handler of the upstream accelerometer listener
    fn accel_handler(&self, gravity: VSensorId) -> Rc<dyn ListenerHandler> {
        let state = Rc::clone(&self.state);
        let time_constant_us = self.time_constant_us;

        handler_fn(move |hub, _listener, event| match *event {
            ListenerEvent::NewData(SensorData::Vector {
                timestamp_us,
                value,
                accuracy,
            }) => {
                let sample =
                    state
                        .borrow_mut()
                        .filter(value, timestamp_us, accuracy, time_constant_us);
                hub.notify_data(gravity, sample);
            }
            ListenerEvent::FlushComplete => hub.notify_flush_complete(gravity),
            _ => {}
        })
    }
}

impl VSensorProducer for GravitySensor {
    fn update(&self, hub: &mut VSensorHub, id: VSensorId, event: VSensorEvent<'_>) -> Result<()> {
        match event {
            VSensorEvent::Setup => {
                let handler = self.accel_handler(id);
                let listener = hub.attach_rir(self.accel, Some(handler), 0)?;
                self.state.borrow_mut().listener = Some(listener);
                Ok(())
            }
            VSensorEvent::Subscribe => {
                if let Some(listener) = self.listener() {
                    hub.enable(listener);
                }
                Ok(())
            }
            VSensorEvent::Unsubscribe => {
                if let Some(listener) = self.listener() {
                    hub.disable(listener);
                }
                self.state.borrow_mut().estimate = None;
                Ok(())
            }
            VSensorEvent::NewRequestedRi(ri) => {
                if let Some(listener) = self.listener() {
                    hub.set_ri(listener, ri);
                }
                Ok(())
            }
            VSensorEvent::NewRequestedMrl(mrl) => {
                if let Some(listener) = self.listener() {
                    hub.set_mrl(listener, mrl);
                }
                Ok(())
            }
            VSensorEvent::GetData(out) => {
                *out = self.state.borrow().last;
                Ok(())
            }
            VSensorEvent::FlushData => match self.listener() {
                Some(listener) if hub.is_active(listener) => hub.flush(self.accel),
                _ => {
                    hub.notify_flush_complete(id);
                    Ok(())
                }
            },
            _ => Err(VSensorError::Unsupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::imu::{ImuChannel, ImuVSensors, MockImu};
    use crate::devices::traits::ImuReading;
    use imu_sdk_core::traits::MockTime;
    use imu_sdk_core::vsensor::mock::EventLog;
    use imu_sdk_core::vsensor::SetupStatus;

    fn setup() -> (VSensorHub, ImuVSensors<MockImu>, VSensorId) {
        let mut hub = VSensorHub::new();
        let sensors =
            ImuVSensors::register(&mut hub, MockImu::default(), VSensorAttr::new(1000)).unwrap();
        let gravity =
            GravitySensor::register(&mut hub, sensors.id(ImuChannel::Accel), 10_000.0).unwrap();
        (hub, sensors, gravity)
    }

    #[test]
    fn test_filter_first_sample_passes_through() {
        let mut state = GravityState::default();
        let sample = state.filter(Vector3::new(1.0, 2.0, 3.0), 100, 3, 1000.0);
        assert_eq!(sample.vector(), Some(Vector3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_filter_step_response() {
        let mut state = GravityState::default();
        state.filter(Vector3::zeros(), 0, 3, 1000.0);

        // dt == tau gives alpha = 0.5
        let half = state.filter(Vector3::new(0.0, 0.0, 8.0), 1000, 3, 1000.0);
        assert_eq!(half.vector(), Some(Vector3::new(0.0, 0.0, 4.0)));

        let three_quarters = state.filter(Vector3::new(0.0, 0.0, 8.0), 2000, 3, 1000.0);
        assert_eq!(three_quarters.vector(), Some(Vector3::new(0.0, 0.0, 6.0)));
    }

    #[test]
    fn test_filter_ignores_stale_timestamp() {
        let mut state = GravityState::default();
        state.filter(Vector3::new(0.0, 0.0, 9.0), 500, 3, 1000.0);
        let same = state.filter(Vector3::new(5.0, 5.0, 5.0), 500, 3, 1000.0);
        assert_eq!(same.vector(), Some(Vector3::new(0.0, 0.0, 9.0)));
    }

    #[test]
    fn test_setup_attaches_to_accelerometer() {
        let (mut hub, sensors, gravity) = setup();
        let accel = sensors.id(ImuChannel::Accel);

        hub.attach(gravity, None, 0).unwrap();

        assert_eq!(hub.status(accel), Some(SetupStatus::SetupOk));
        assert_eq!(hub.subscriber_count(accel), 0);
        assert!(!sensors.is_powered());
    }

    #[test]
    fn test_unhealthy_accelerometer_fails_gravity_setup() {
        let (mut hub, sensors, gravity) = setup();
        sensors.with_imu(|imu| imu.set_healthy(false));

        assert_eq!(hub.attach(gravity, None, 0), Err(VSensorError::SetupFailed));
        assert_eq!(hub.status(gravity), Some(SetupStatus::SetupError));
    }

    #[test]
    fn test_subscription_drives_accelerometer() {
        let (mut hub, sensors, gravity) = setup();
        let accel = sensors.id(ImuChannel::Accel);
        let app = hub.attach(gravity, None, 0).unwrap();
        hub.set_ri(app, 20_000);

        hub.enable(app);
        assert!(sensors.is_powered());
        assert_eq!(hub.subscriber_count(accel), 1);
        assert_eq!(hub.effective_ri(accel), Some(20_000));

        hub.disable(app);
        assert!(!sensors.is_powered());
        assert_eq!(hub.subscriber_count(accel), 0);
    }

    #[test]
    fn test_publishes_filtered_gravity() {
        let (mut hub, sensors, gravity) = setup();
        let time = MockTime::new();
        let log = Rc::new(EventLog::new());
        let app = hub.attach(gravity, Some(log.handler()), 0).unwrap();
        hub.set_ri(app, 10_000);
        hub.enable(app);

        sensors.with_imu(|imu| {
            imu.set_default_reading(ImuReading {
                accel: Vector3::new(0.0, 0.0, 9.8),
                ..Default::default()
            })
        });
        for _ in 0..5 {
            sensors.poll(&mut hub, &time).unwrap();
            time.advance(10_000);
        }

        assert_eq!(log.data_count(), 5);
        let estimate = hub.get_data(gravity).unwrap().vector().unwrap();
        assert!((estimate.z - 9.8).abs() < 1e-4);
    }

    #[test]
    fn test_flush_completes_when_idle() {
        let (mut hub, _sensors, gravity) = setup();
        let log = Rc::new(EventLog::new());
        let app = hub.attach(gravity, Some(log.handler()), 0).unwrap();

        // not subscribed: nobody is listening, nothing to flush upstream
        hub.flush(gravity).unwrap();
        assert!(log.is_empty());

        hub.enable(app);
        log.clear();
        hub.flush(gravity).unwrap();
        assert_eq!(log.events(), [ListenerEvent::FlushComplete]);
    }
}
