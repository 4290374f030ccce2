//! IMU VSensor adapter
//!
//! Publishes one [`ImuSource`] as four VSensors (accelerometer, gyroscope,
//! magnetometer, temperature) sharing the same device.
//!
//! - The device is powered while at least one channel has a subscriber.
//! - Each channel's requested RI is snapped to a supported output data period
//!   at or below the request; the device runs at the fastest period any
//!   subscribed channel needs.
//! - [`ImuVSensors::poll`] is called from the main loop and emits `NEW_DATA`
//!   on every subscribed channel whose effective RI has elapsed.
//! - Vector channels accept reference frame, offset and gain settings.

use alloc::rc::Rc;
use core::cell::RefCell;

use imu_sdk_core::traits::TimeSource;
use imu_sdk_core::vsensor::{
    Result, SensorConfig, SensorData, SensorType, VSensorAttr, VSensorError, VSensorEvent,
    VSensorHub, VSensorId, VSensorProducer,
};
use nalgebra::{Matrix3, Vector3};

use crate::devices::traits::{ImuReading, ImuSource};

/// Output data periods supported by the adapter, fastest first (µs)
pub const SUPPORTED_PERIODS_US: [u32; 9] = [
    1_000, 2_500, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000, 1_000_000,
];

/// Payload size of a 3-axis channel (3 x f32)
pub const VECTOR_PAYLOAD_SIZE: u16 = 12;

/// Payload size of a scalar channel (f32)
pub const SCALAR_PAYLOAD_SIZE: u16 = 4;

/// Largest supported period not slower than `requested_us`
///
/// Requests faster than the fastest supported period get the fastest one.
pub fn snap_period(requested_us: u32) -> u32 {
    SUPPORTED_PERIODS_US
        .iter()
        .rev()
        .copied()
        .find(|p| *p <= requested_us)
        .unwrap_or(SUPPORTED_PERIODS_US[0])
}

/// One output of the IMU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImuChannel {
    Accel,
    Gyro,
    Mag,
    Temperature,
}

impl ImuChannel {
    pub const ALL: [ImuChannel; 4] = [
        ImuChannel::Accel,
        ImuChannel::Gyro,
        ImuChannel::Mag,
        ImuChannel::Temperature,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn sensor_type(self) -> SensorType {
        match self {
            ImuChannel::Accel => SensorType::Accelerometer,
            ImuChannel::Gyro => SensorType::Gyroscope,
            ImuChannel::Mag => SensorType::Magnetometer,
            ImuChannel::Temperature => SensorType::Temperature,
        }
    }

    pub fn payload_size(self) -> u16 {
        match self {
            ImuChannel::Temperature => SCALAR_PAYLOAD_SIZE,
            _ => VECTOR_PAYLOAD_SIZE,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.sensor_type().name()
    }

    fn raw_vector(self, reading: &ImuReading) -> Option<Vector3<f32>> {
        match self {
            ImuChannel::Accel => Some(reading.accel),
            ImuChannel::Gyro => Some(reading.gyro),
            ImuChannel::Mag => Some(reading.mag),
            ImuChannel::Temperature => None,
        }
    }
}

/// Per-channel correction: `frame * gain * (raw - offset)`
#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelCorrection {
    frame: Matrix3<f32>,
    gain: Matrix3<f32>,
    offset: Vector3<f32>,
}

impl Default for ChannelCorrection {
    fn default() -> Self {
        Self {
            frame: Matrix3::identity(),
            gain: Matrix3::identity(),
            offset: Vector3::zeros(),
        }
    }
}

impl ChannelCorrection {
    fn apply(&self, raw: Vector3<f32>) -> Vector3<f32> {
        self.frame * (self.gain * (raw - self.offset))
    }
}

#[derive(Default)]
struct ChannelState {
    subscribed: bool,
    /// Snapped period, 0 while unused
    period_us: u32,
    last_emit_us: Option<u64>,
    correction: ChannelCorrection,
}

struct DeviceState<I> {
    imu: I,
    channels: [ChannelState; 4],
    powered: bool,
    device_period_us: u32,
    last: Option<ImuReading>,
}

impl<I: ImuSource> DeviceState<I> {
    fn sample(&self, channel: ImuChannel, reading: &ImuReading) -> SensorData {
        let state = &self.channels[channel.index()];
        match channel.raw_vector(reading) {
            Some(raw) => SensorData::Vector {
                timestamp_us: reading.timestamp_us,
                value: state.correction.apply(raw),
                accuracy: 3,
            },
            None => SensorData::Scalar {
                timestamp_us: reading.timestamp_us,
                value: reading.temperature,
            },
        }
    }

    /// Run the device at the fastest period any channel needs
    fn reprogram_period(&mut self) -> Result<()> {
        let fastest = self
            .channels
            .iter()
            .map(|c| c.period_us)
            .filter(|p| *p != 0)
            .min();

        if let Some(period) = fastest {
            if period != self.device_period_us {
                self.imu.set_sample_period_us(period)?;
                self.device_period_us = period;
                log_debug!("imu sample period set to {} us", period);
            }
        }
        Ok(())
    }

    fn any_subscribed(&self) -> bool {
        self.channels.iter().any(|c| c.subscribed)
    }
}

/// Producer behind one channel VSensor
struct ChannelProducer<I> {
    channel: ImuChannel,
    device: Rc<RefCell<DeviceState<I>>>,
}

impl<I: ImuSource> ChannelProducer<I> {
    fn subscribe(&self) -> Result<()> {
        let mut device = self.device.borrow_mut();
        if !device.powered {
            device.imu.set_enabled(true)?;
            device.powered = true;
            log_info!("imu powered up");
        }
        let state = &mut device.channels[self.channel.index()];
        state.subscribed = true;
        state.last_emit_us = None;
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        let mut device = self.device.borrow_mut();
        let state = &mut device.channels[self.channel.index()];
        state.subscribed = false;
        state.period_us = 0;

        if device.any_subscribed() {
            // the departing channel may have been the fastest one
            device.reprogram_period()?;
        } else if device.powered {
            device.imu.set_enabled(false)?;
            device.powered = false;
            log_info!("imu powered down");
        }
        Ok(())
    }

    fn set_config(&self, config: &SensorConfig) -> Result<()> {
        if self.channel == ImuChannel::Temperature {
            return Err(VSensorError::Unsupported);
        }
        let mut device = self.device.borrow_mut();
        let correction = &mut device.channels[self.channel.index()].correction;
        match *config {
            SensorConfig::ReferenceFrame(frame) => {
                // mounting matrices are rotations, possibly with a reflection
                if (frame.determinant().abs() - 1.0).abs() > 1e-3 {
                    return Err(VSensorError::InvalidConfig);
                }
                correction.frame = frame;
            }
            SensorConfig::Gain(gain) => correction.gain = gain,
            SensorConfig::Offset(offset) => correction.offset = offset,
            _ => return Err(VSensorError::Unsupported),
        }
        Ok(())
    }

    fn get_config(&self, config: &mut SensorConfig) -> Result<()> {
        if self.channel == ImuChannel::Temperature {
            return Err(VSensorError::Unsupported);
        }
        let device = self.device.borrow();
        let correction = &device.channels[self.channel.index()].correction;
        *config = match *config {
            SensorConfig::ReferenceFrame(_) => SensorConfig::ReferenceFrame(correction.frame),
            SensorConfig::Gain(_) => SensorConfig::Gain(correction.gain),
            SensorConfig::Offset(_) => SensorConfig::Offset(correction.offset),
            _ => return Err(VSensorError::Unsupported),
        };
        Ok(())
    }

    fn last_sample(&self) -> Option<SensorData> {
        let device = self.device.borrow();
        device
            .last
            .map(|reading| device.sample(self.channel, &reading))
    }
}

impl<I: ImuSource> VSensorProducer for ChannelProducer<I> {
    fn update(&self, hub: &mut VSensorHub, id: VSensorId, event: VSensorEvent<'_>) -> Result<()> {
        match event {
            VSensorEvent::Setup => {
                if !self.device.borrow().imu.is_healthy() {
                    log_error!("imu {} setup: device unhealthy", self.channel.as_str());
                    return Err(crate::devices::traits::ImuError::SelfTestFailed.into());
                }
                Ok(())
            }
            VSensorEvent::Subscribe => self.subscribe(),
            VSensorEvent::Unsubscribe => self.unsubscribe(),
            VSensorEvent::NewRequestedRi(ri) => {
                let period = snap_period(ri);
                {
                    let mut device = self.device.borrow_mut();
                    device.channels[self.channel.index()].period_us = period;
                    device.reprogram_period()?;
                }
                hub.set_effective_ri(id, period);
                Ok(())
            }
            VSensorEvent::NewRequestedMrl(_) => {
                // no FIFO: every sample is delivered as soon as it is read
                hub.set_effective_mrl(id, 0);
                Ok(())
            }
            VSensorEvent::SetConfig(config) => {
                self.set_config(config)?;
                hub.notify_config(id, *config);
                Ok(())
            }
            VSensorEvent::GetConfig(config) => self.get_config(config),
            VSensorEvent::GetData(out) => {
                *out = self.last_sample();
                Ok(())
            }
            VSensorEvent::FlushData => {
                if let Some(sample) = self.last_sample() {
                    hub.notify_data(id, sample);
                }
                hub.notify_flush_complete(id);
                Ok(())
            }
            VSensorEvent::Custom(_) => Err(VSensorError::Unsupported),
        }
    }
}

/// The VSensors of one IMU device
pub struct ImuVSensors<I> {
    device: Rc<RefCell<DeviceState<I>>>,
    ids: [VSensorId; 4],
}

impl<I: ImuSource + 'static> ImuVSensors<I> {
    /// Register one VSensor per channel of `imu`
    pub fn register(hub: &mut VSensorHub, imu: I, attr: VSensorAttr) -> Result<Self> {
        let device = Rc::new(RefCell::new(DeviceState {
            imu,
            channels: Default::default(),
            powered: false,
            device_period_us: 0,
            last: None,
        }));

        let mut register = |channel: ImuChannel| {
            let producer = Rc::new(ChannelProducer {
                channel,
                device: Rc::clone(&device),
            });
            hub.register_vsensor(
                producer,
                channel.sensor_type(),
                channel.payload_size(),
                Some(attr),
            )
        };
        let ids = [
            register(ImuChannel::Accel)?,
            register(ImuChannel::Gyro)?,
            register(ImuChannel::Mag)?,
            register(ImuChannel::Temperature)?,
        ];

        Ok(Self { device, ids })
    }
}

impl<I: ImuSource> ImuVSensors<I> {
    /// VSensor publishing `channel`
    pub fn id(&self, channel: ImuChannel) -> VSensorId {
        self.ids[channel.index()]
    }

    pub fn is_powered(&self) -> bool {
        self.device.borrow().powered
    }

    /// Run `f` against the underlying device
    pub fn with_imu<R>(&self, f: impl FnOnce(&mut I) -> R) -> R {
        f(&mut self.device.borrow_mut().imu)
    }

    /// Sample the device once if any subscribed channel is due, and publish
    /// the sample on every due channel.
    ///
    /// Returns the number of channels that emitted `NEW_DATA`.
    pub fn poll<T: TimeSource>(&self, hub: &mut VSensorHub, time: &T) -> Result<usize> {
        let now = time.now_us();

        let mut due = heapless::Vec::<(ImuChannel, SensorData), 4>::new();
        {
            let mut device = self.device.borrow_mut();
            if !device.powered {
                return Ok(0);
            }

            let ready = |state: &ChannelState| {
                state.subscribed
                    && state.period_us != 0
                    && state
                        .last_emit_us
                        .map_or(true, |last| now.saturating_sub(last) >= u64::from(state.period_us))
            };
            if !device.channels.iter().any(ready) {
                return Ok(0);
            }

            let reading = device.imu.read_all()?;
            device.last = Some(reading);

            for channel in ImuChannel::ALL {
                if ready(&device.channels[channel.index()]) {
                    device.channels[channel.index()].last_emit_us = Some(now);
                    let _ = due.push((channel, device.sample(channel, &reading)));
                }
            }
        }

        for (channel, sample) in &due {
            hub.notify_data(self.id(*channel), *sample);
        }
        Ok(due.len())
    }
}
