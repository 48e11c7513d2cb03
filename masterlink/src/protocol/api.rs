//! Command table of the classic master.
//!
//! Every command is a `static` [`CommandSpec`]; callers pass the returned
//! reference to [`crate::MasterCommunicator::do_command`].

use super::{command::CommandSpec, field::Field};

/// Basic action: turn a light off.
pub const BA_LIGHT_OFF: u8 = 160;
/// Basic action: turn a light on.
pub const BA_LIGHT_ON: u8 = 161;
/// Basic action: toggle a light.
pub const BA_LIGHT_TOGGLE: u8 = 162;
/// Basic action: turn all lights off.
pub const BA_ALL_LIGHTS_OFF: u8 = 163;
/// Basic action: turn all outputs off.
pub const BA_ALL_OUTPUTS_OFF: u8 = 164;
/// Basic action: light on at minimum dimmer level.
pub const BA_LIGHT_ON_DIMMER_MIN: u8 = 165;
/// Basic action: light on at maximum dimmer level.
pub const BA_LIGHT_ON_DIMMER_MAX: u8 = 166;
/// Basic action: raise the dimmer by 5%.
pub const BA_LIGHT_ON_DIMMER_PLUS_5: u8 = 167;
/// Basic action: lower the dimmer by 5%.
pub const BA_LIGHTS_ON_DIMMER_MIN_5: u8 = 168;
/// Basic action: set the dimmer to its minimum.
pub const BA_DIMMER_MIN: u8 = 169;
/// Basic action: set the dimmer to its maximum.
pub const BA_DIMMER_MAX: u8 = 170;
/// Basic action: turn the lights of a floor off.
pub const BA_LIGHTS_OFF_FLOOR: u8 = 171;
/// Basic action: turn the lights of a floor on.
pub const BA_LIGHTS_ON_FLOOR: u8 = 172;
/// Basic action: toggle the lights of a floor.
pub const BA_LIGHTS_TOGGLE_FLOOR: u8 = 173;
/// Basic action: light on at 10%; 20%..90% follow at +1 per step.
pub const BA_LIGHT_ON_DIMMER_10: u8 = 176;
/// Basic action: light on at 90%.
pub const BA_LIGHT_ON_DIMMER_90: u8 = 184;
/// Basic action: toggle a light at 10%; 20%..100% follow at +1 per step.
pub const BA_LIGHT_TOGGLE_DIMMER_10: u8 = 185;
/// Basic action: toggle a light at 100%.
pub const BA_LIGHT_TOGGLE_DIMMER_100: u8 = 194;
/// Basic action: light on with a 150 s timer, overruling a running timer.
pub const BA_LIGHT_ON_TIMER_150_OVERRULE: u8 = 195;
/// Basic action: light on with a 3120 s timer, overruling a running timer.
pub const BA_LIGHT_ON_TIMER_3120_OVERRULE: u8 = 200;
/// Basic action: light on with a 150 s timer, keeping a running timer.
pub const BA_LIGHT_ON_TIMER_150_NO_OVERRULE: u8 = 201;
/// Basic action: light on with a 3120 s timer, keeping a running timer.
pub const BA_LIGHT_ON_TIMER_3120_NO_OVERRULE: u8 = 206;

/// Basic action code that turns a light on at `percent` (10..=90, step 10).
pub fn light_on_dimmer(percent: u8) -> Option<u8> {
    (percent % 10 == 0 && (10..=90).contains(&percent))
        .then(|| BA_LIGHT_ON_DIMMER_10 + percent / 10 - 1)
}

const ZERO13: &[Field] = &[Field::padding(13)];
const RESP: &[Field] = &[Field::str("resp", 2), Field::padding(11), Field::lit(b"\r\n")];

const BASIC_ACTION_INPUT: &[Field] = &[
    Field::byte("action_type"),
    Field::byte("action_number"),
    Field::padding(11),
];
static BASIC_ACTION: CommandSpec = CommandSpec::new("BA", BASIC_ACTION_INPUT, Some(RESP));

static RESET: CommandSpec = CommandSpec::new("re", ZERO13, Some(RESP));

const STATUS_OUTPUT: &[Field] = &[
    Field::lit(b"\x00\x00"),
    Field::byte("hours"),
    Field::byte("minutes"),
    Field::byte("year"),
    Field::byte("month"),
    Field::byte("day"),
    Field::byte("weekday"),
    Field::byte("mode"),
    Field::byte("f1"),
    Field::byte("f2"),
    Field::byte("f3"),
    Field::byte("h"),
    Field::lit(b"\r\n"),
];
static STATUS: CommandSpec = CommandSpec::new("ST", ZERO13, Some(STATUS_OUTPUT));

const EEPROM_LIST_INPUT: &[Field] = &[Field::byte("bank"), Field::padding(12)];
const EEPROM_LIST_OUTPUT: &[Field] = &[Field::byte("bank"), Field::str("data", 256)];
static EEPROM_LIST: CommandSpec =
    CommandSpec::new("EL", EEPROM_LIST_INPUT, Some(EEPROM_LIST_OUTPUT));

const WRITE_EEPROM_INPUT: &[Field] = &[
    Field::byte("bank"),
    Field::byte("address"),
    Field::varstr("data", 10),
];
const WRITE_EEPROM_OUTPUT: &[Field] = &[
    Field::byte("bank"),
    Field::byte("address"),
    Field::varstr("data", 10),
    Field::lit(b"\r\n"),
];
static WRITE_EEPROM: CommandSpec =
    CommandSpec::new("WE", WRITE_EEPROM_INPUT, Some(WRITE_EEPROM_OUTPUT));

const ACTIVATE_EEPROM_INPUT: &[Field] = &[Field::byte("eep"), Field::padding(12)];
const ACTIVATE_EEPROM_OUTPUT: &[Field] = &[
    Field::byte("eep"),
    Field::str("resp", 2),
    Field::padding(10),
    Field::lit(b"\r\n"),
];
static ACTIVATE_EEPROM: CommandSpec =
    CommandSpec::new("AE", ACTIVATE_EEPROM_INPUT, Some(ACTIVATE_EEPROM_OUTPUT));

const NUMBER_OF_IO_MODULES_OUTPUT: &[Field] = &[
    Field::byte("in"),
    Field::byte("out"),
    Field::padding(11),
    Field::lit(b"\r\n"),
];
static NUMBER_OF_IO_MODULES: CommandSpec =
    CommandSpec::new("rn", ZERO13, Some(NUMBER_OF_IO_MODULES_OUTPUT));

const READ_OUTPUT_INPUT: &[Field] = &[Field::byte("output_nr"), Field::padding(12)];
const READ_OUTPUT_OUTPUT: &[Field] = &[
    Field::byte("output_nr"),
    Field::str("type", 1),
    Field::byte("light"),
    Field::word("timer"),
    Field::word("ctimer"),
    Field::byte("status"),
    Field::dimmer("dimmer"),
    Field::byte("controller_out"),
    Field::byte("max_power"),
    Field::byte("floor_level"),
    Field::str("menu_position", 3),
    Field::str("name", 16),
    Field::crc(),
    Field::lit(b"\r\n\r\n"),
];
static READ_OUTPUT: CommandSpec =
    CommandSpec::new("ro", READ_OUTPUT_INPUT, Some(READ_OUTPUT_OUTPUT));

const READ_INPUT_INPUT: &[Field] = &[Field::byte("input_nr"), Field::padding(12)];
const READ_INPUT_OUTPUT: &[Field] = &[
    Field::byte("input_nr"),
    Field::byte("output_action"),
    Field::str("output_list", 30),
    Field::str("input_name", 8),
    Field::crc(),
    Field::lit(b"\r\n\r\n"),
];
static READ_INPUT: CommandSpec = CommandSpec::new("ri", READ_INPUT_INPUT, Some(READ_INPUT_OUTPUT));

const TWELVE_SENSORS: &[Field] = &[
    Field::byte("series"),
    Field::svt("tmp0"),
    Field::svt("tmp1"),
    Field::svt("tmp2"),
    Field::svt("tmp3"),
    Field::svt("tmp4"),
    Field::svt("tmp5"),
    Field::svt("tmp6"),
    Field::svt("tmp7"),
    Field::svt("tmp8"),
    Field::svt("tmp9"),
    Field::svt("tmp10"),
    Field::svt("tmp11"),
    Field::lit(b"\r\n"),
];

const TEMPERATURE_LIST_INPUT: &[Field] = &[Field::byte("series"), Field::padding(12)];
static TEMPERATURE_LIST: CommandSpec =
    CommandSpec::new("TL", TEMPERATURE_LIST_INPUT, Some(TWELVE_SENSORS));

const SETPOINT_LIST_INPUT: &[Field] = &[Field::byte("series"), Field::padding(12)];
static SETPOINT_LIST: CommandSpec =
    CommandSpec::new("SL", SETPOINT_LIST_INPUT, Some(TWELVE_SENSORS));

const THERMOSTAT_MODE_OUTPUT: &[Field] =
    &[Field::byte("mode"), Field::padding(12), Field::lit(b"\r\n")];
static THERMOSTAT_MODE: CommandSpec = CommandSpec::new("TM", ZERO13, Some(THERMOSTAT_MODE_OUTPUT));

const READ_SETPOINT_INPUT: &[Field] = &[Field::byte("thermostat"), Field::padding(12)];
const READ_SETPOINT_OUTPUT: &[Field] = &[
    Field::byte("thermostat"),
    Field::svt("act"),
    Field::svt("csetp"),
    Field::svt("psetp0"),
    Field::svt("psetp1"),
    Field::svt("psetp2"),
    Field::svt("psetp3"),
    Field::svt("psetp4"),
    Field::svt("psetp5"),
    Field::byte("sensor_nr"),
    Field::byte("output0_nr"),
    Field::byte("output1_nr"),
    Field::byte("output0"),
    Field::byte("output1"),
    Field::svt("outside"),
    Field::byte("mode"),
    Field::str("name", 16),
    Field::byte("pid_p"),
    Field::byte("pid_i"),
    Field::byte("pid_d"),
    Field::byte("pid_ithresh"),
    Field::svt("threshold_temp"),
    Field::byte("days"),
    Field::byte("hours"),
    Field::byte("minutes"),
    Field::byte("mon_start_d1"),
    Field::byte("mon_stop_d1"),
    Field::byte("mon_start_d2"),
    Field::byte("mon_stop_d2"),
    Field::byte("tue_start_d1"),
    Field::byte("tue_stop_d1"),
    Field::byte("tue_start_d2"),
    Field::byte("tue_stop_d2"),
    Field::byte("wed_start_d1"),
    Field::byte("wed_stop_d1"),
    Field::byte("wed_start_d2"),
    Field::byte("wed_stop_d2"),
    Field::byte("thu_start_d1"),
    Field::byte("thu_stop_d1"),
    Field::byte("thu_start_d2"),
    Field::byte("thu_stop_d2"),
    Field::byte("fri_start_d1"),
    Field::byte("fri_stop_d1"),
    Field::byte("fri_start_d2"),
    Field::byte("fri_stop_d2"),
    Field::byte("sat_start_d1"),
    Field::byte("sat_stop_d1"),
    Field::byte("sat_start_d2"),
    Field::byte("sat_stop_d2"),
    Field::byte("sun_start_d1"),
    Field::byte("sun_stop_d1"),
    Field::byte("sun_start_d2"),
    Field::byte("sun_stop_d2"),
    Field::crc(),
    Field::lit(b"\r\n\r\n"),
];
static READ_SETPOINT: CommandSpec =
    CommandSpec::new("rs", READ_SETPOINT_INPUT, Some(READ_SETPOINT_OUTPUT));

const WRITE_SETPOINT_INPUT: &[Field] = &[
    Field::byte("thermostat"),
    Field::byte("config"),
    Field::svt("temp"),
    Field::padding(10),
];
const WRITE_SETPOINT_OUTPUT: &[Field] = &[
    Field::byte("thermostat"),
    Field::byte("config"),
    Field::svt("temp"),
    Field::padding(10),
    Field::lit(b"\r\n"),
];
static WRITE_SETPOINT: CommandSpec =
    CommandSpec::new("ws", WRITE_SETPOINT_INPUT, Some(WRITE_SETPOINT_OUTPUT));

const SENSOR_HUMIDITY_LIST_OUTPUT: &[Field] = &[
    Field::svt("hum0"),
    Field::svt("hum1"),
    Field::svt("hum2"),
    Field::svt("hum3"),
    Field::svt("hum4"),
    Field::svt("hum5"),
    Field::svt("hum6"),
    Field::svt("hum7"),
    Field::svt("hum8"),
    Field::svt("hum9"),
    Field::svt("hum10"),
    Field::svt("hum11"),
    Field::svt("hum12"),
    Field::svt("hum13"),
    Field::svt("hum14"),
    Field::svt("hum15"),
    Field::svt("hum16"),
    Field::svt("hum17"),
    Field::svt("hum18"),
    Field::svt("hum19"),
    Field::svt("hum20"),
    Field::svt("hum21"),
    Field::svt("hum22"),
    Field::svt("hum23"),
    Field::svt("hum24"),
    Field::svt("hum25"),
    Field::svt("hum26"),
    Field::svt("hum27"),
    Field::svt("hum28"),
    Field::svt("hum29"),
    Field::svt("hum30"),
    Field::svt("hum31"),
    Field::crc(),
    Field::lit(b"\r\n"),
];
static SENSOR_HUMIDITY_LIST: CommandSpec =
    CommandSpec::new("hh", ZERO13, Some(SENSOR_HUMIDITY_LIST_OUTPUT));

static TO_CLI_MODE: CommandSpec = CommandSpec::new("CM", ZERO13, None);

const OUTPUT_LIST_INPUT: &[Field] = &[];
const OUTPUT_LIST_OUTPUT: &[Field] = &[Field::output_list("outputs"), Field::lit(b"\r\n\r\n")];
static OUTPUT_LIST: CommandSpec =
    CommandSpec::new("OL", OUTPUT_LIST_INPUT, Some(OUTPUT_LIST_OUTPUT));

/// Execute a basic action (`action_type`, `action_number`).
pub fn basic_action() -> &'static CommandSpec {
    &BASIC_ACTION
}

/// Reset the master.
pub fn reset() -> &'static CommandSpec {
    &RESET
}

/// Clock and operating mode of the master.
pub fn status() -> &'static CommandSpec {
    &STATUS
}

/// Read one 256-byte eeprom bank.
pub fn eeprom_list() -> &'static CommandSpec {
    &EEPROM_LIST
}

/// Write up to 10 bytes into an eeprom bank.
pub fn write_eeprom() -> &'static CommandSpec {
    &WRITE_EEPROM
}

/// Activate eeprom changes. Slow; callers pass a longer timeout.
pub fn activate_eeprom() -> &'static CommandSpec {
    &ACTIVATE_EEPROM
}

/// Number of input and output modules.
pub fn number_of_io_modules() -> &'static CommandSpec {
    &NUMBER_OF_IO_MODULES
}

/// State and configuration of one output.
pub fn read_output() -> &'static CommandSpec {
    &READ_OUTPUT
}

/// Configuration of one input.
pub fn read_input() -> &'static CommandSpec {
    &READ_INPUT
}

/// Temperatures of a series of 12 thermostat sensors.
pub fn temperature_list() -> &'static CommandSpec {
    &TEMPERATURE_LIST
}

/// Current setpoints of a series of 12 thermostats.
pub fn setpoint_list() -> &'static CommandSpec {
    &SETPOINT_LIST
}

/// Global thermostat mode.
pub fn thermostat_mode() -> &'static CommandSpec {
    &THERMOSTAT_MODE
}

/// Programmed configuration of one thermostat.
pub fn read_setpoint() -> &'static CommandSpec {
    &READ_SETPOINT
}

/// Write a setpoint of one thermostat.
pub fn write_setpoint() -> &'static CommandSpec {
    &WRITE_SETPOINT
}

/// Humidity of all 32 sensors. The reply carries a checksum.
pub fn sensor_humidity_list() -> &'static CommandSpec {
    &SENSOR_HUMIDITY_LIST
}

/// Switch the master to its interactive CLI. No reply.
pub fn to_cli_mode() -> &'static CommandSpec {
    &TO_CLI_MODE
}

/// Event sent by the master whenever outputs change.
pub fn output_list() -> &'static CommandSpec {
    &OUTPUT_LIST
}
