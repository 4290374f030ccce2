//! Sensor type catalog
//!
//! Integer tags identifying the kind of data a VSensor publishes. The numeric
//! values are stable and shared with host tooling.

macro_rules! sensor_types {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// Kind of data published by a VSensor
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum SensorType {
            /// Sentinel for a producer that was never initialized
            #[default]
            Unknown = 0,
            $(
                #[doc = $name]
                $variant = $code,
            )*
        }

        impl SensorType {
            /// Every catalogued type, in code order
            pub const ALL: &'static [SensorType] =
                &[SensorType::Unknown, $(SensorType::$variant,)*];

            /// Numeric tag of this type
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Look up a type by numeric tag
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    0 => Some(SensorType::Unknown),
                    $($code => Some(SensorType::$variant),)*
                    _ => None,
                }
            }

            /// Upper-snake name used by host tooling
            pub const fn name(self) -> &'static str {
                match self {
                    SensorType::Unknown => "UNKNOWN",
                    $(SensorType::$variant => $name,)*
                }
            }

            /// Look up a type by its upper-snake name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    "UNKNOWN" => Some(SensorType::Unknown),
                    $($name => Some(SensorType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

sensor_types! {
    Accelerometer = 1 => "ACCELEROMETER",
    Magnetometer = 2 => "MAGNETOMETER",
    Orientation = 3 => "ORIENTATION",
    Gyroscope = 4 => "GYROSCOPE",
    Light = 5 => "LIGHT",
    Pressure = 6 => "PRESSURE",
    Temperature = 7 => "TEMPERATURE",
    Proximity = 8 => "PROXIMITY",
    Gravity = 9 => "GRAVITY",
    LinearAcceleration = 10 => "LINEAR_ACCELERATION",
    RotationVector = 11 => "ROTATION_VECTOR",
    Humidity = 12 => "HUMIDITY",
    UncalMagnetometer = 13 => "UNCAL_MAGNETOMETER",
    AmbientTemperature = 14 => "AMBIENT_TEMPERATURE",
    GameRotationVector = 15 => "GAME_ROTATION_VECTOR",
    UncalGyroscope = 16 => "UNCAL_GYROSCOPE",
    Smd = 17 => "SMD",
    StepDetector = 18 => "STEP_DETECTOR",
    StepCounter = 19 => "STEP_COUNTER",
    GeomagRotationVector = 20 => "GEOMAG_ROTATION_VECTOR",
    HeartRate = 21 => "HEART_RATE",
    TiltDetector = 22 => "TILT_DETECTOR",
    WakeGesture = 23 => "WAKE_GESTURE",
    GlanceGesture = 24 => "GLANCE_GESTURE",
    PickUpGesture = 25 => "PICK_UP_GESTURE",
    RawAccelerometer = 26 => "RAW_ACCELEROMETER",
    RawMagnetometer = 27 => "RAW_MAGNETOMETER",
    RawGyroscope = 28 => "RAW_GYROSCOPE",
    Bac = 29 => "BAC",
    B2s = 30 => "B2S",
    Pdr = 31 => "PDR",
    AccRotationVector = 32 => "ACC_ROTATION_VECTOR",
    RawTemperature = 33 => "RAW_TEMPERATURE",
    Custom0 = 48 => "CUSTOM_0",
    Custom1 = 49 => "CUSTOM_1",
    Custom2 = 50 => "CUSTOM_2",
    Custom3 = 51 => "CUSTOM_3",
    Custom4 = 52 => "CUSTOM_4",
    Custom5 = 53 => "CUSTOM_5",
    Custom6 = 54 => "CUSTOM_6",
    Custom7 = 55 => "CUSTOM_7",
}

impl SensorType {
    /// First code of the application-defined range
    pub const CUSTOM_MIN: u8 = 48;

    /// Upper bound (exclusive) for any type code
    pub const MAX: u8 = 64;

    /// Application-defined type number `n` (0..8)
    pub fn custom(n: u8) -> Option<Self> {
        if n < 8 {
            Self::from_code(Self::CUSTOM_MIN + n)
        } else {
            None
        }
    }

    /// True for application-defined types
    pub fn is_custom(self) -> bool {
        self.code() >= Self::CUSTOM_MIN
    }
}
