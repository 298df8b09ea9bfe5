use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vbiasctl_frame::StatusWords;

/// Full-scale DAC code.
pub const MAX_CODE: u16 = 0x3fff;

/// Divider on the -5 V monitor: top resistor.
const NEG5V_R1: f64 = 100e3;
/// Divider on the -5 V monitor: bottom resistor.
const NEG5V_R2: f64 = 33.2e3;

// Status word positions.
const W_TCHIP: usize = 0;
const W_NEG5V: usize = 1;
const W_POS3_3V: usize = 2;
const W_POS5V: usize = 3;
const W_POS1_2V: usize = 4;
const W_SUMREF_2: usize = 10;
const W_GAINMODE: usize = 11;
const W_THERM_2: usize = 12;
const W_SUMREF_1: usize = 13;
const W_DAC_DIODE: usize = 14;
const W_DAC_HEALTH: usize = 15;
const W_THERM_1: usize = 16;

/// Reference voltages and sensor curves used to convert raw words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// ADC reference (V). Default: 2.5.
    pub adc_vref: f64,
    /// DAC reference (V). Default: 3.3.
    pub dac_vref: f64,
    /// DAC temperature diode forward voltage at `diode_tref` (V).
    pub diode_vf: f64,
    /// Reference temperature of the diode curve (C).
    pub diode_tref: f64,
    /// Diode temperature coefficient (V/C).
    pub diode_tcoef: f64,
    /// Thermistor polynomial in ln(R/kOhm), lowest order first.
    pub thermistor: [f64; 5],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            adc_vref: 2.5,
            dac_vref: 3.3,
            diode_vf: 0.650,
            diode_tref: 25.0,
            diode_tcoef: -0.0022,
            thermistor: [142.973, -34.6419, 2.62172, -0.167948, 0.00531447],
        }
    }
}

impl Calibration {
    /// Volts per ADC count on the status monitors.
    fn adc_scale(&self) -> f64 {
        2.0 * self.adc_vref / 4096.0
    }

    fn monitor(&self, words: &StatusWords, index: usize, gain: f64) -> f64 {
        f64::from(words.word(index)) * gain * self.adc_scale()
    }

    fn thermistor_temperature(&self, pos5v: f64, vtherm: f64) -> f64 {
        let x = (100.0 * (pos5v - vtherm) / vtherm).ln();
        self.thermistor
            .iter()
            .rev()
            .fold(0.0, |acc, coef| acc * x + coef)
    }

    /// Convert one reading from a single status snapshot.
    pub fn convert(&self, reading: Reading, words: &StatusWords) -> f64 {
        let pos5v = || self.monitor(words, W_POS5V, 1.005);
        match reading {
            Reading::Tchip => f64::from(words.word(W_TCHIP)) * 0.25,
            Reading::Pos5V => pos5v(),
            Reading::Neg5V => {
                let tap = self.monitor(words, W_NEG5V, 1.001);
                tap * (NEG5V_R1 + NEG5V_R2) / NEG5V_R2 - pos5v() * NEG5V_R1 / NEG5V_R2
            }
            Reading::Pos3_3V => self.monitor(words, W_POS3_3V, 1.005),
            Reading::Pos1_2V => self.monitor(words, W_POS1_2V, 1.005),
            Reading::Vsumref1 => self.monitor(words, W_SUMREF_1, 1.005),
            Reading::Vsumref2 => self.monitor(words, W_SUMREF_2, 1.005),
            Reading::Vgainmode => self.monitor(words, W_GAINMODE, 2.018),
            Reading::Gainmode => {
                let volts = self.convert(Reading::Vgainmode, words);
                f64::from(GainMode::from_volts(volts).code())
            }
            Reading::Vtherm1 => self.monitor(words, W_THERM_1, 1.005),
            Reading::Vtherm2 => self.monitor(words, W_THERM_2, 1.005),
            Reading::Tpreamp1 => {
                self.thermistor_temperature(pos5v(), self.convert(Reading::Vtherm1, words))
            }
            Reading::Tpreamp2 => {
                self.thermistor_temperature(pos5v(), self.convert(Reading::Vtherm2, words))
            }
            Reading::VdacHealth => self.monitor(words, W_DAC_HEALTH, 40.5),
            Reading::VdacDiode => self.monitor(words, W_DAC_DIODE, 1.005),
            Reading::Tdac => {
                let vdiode = self.convert(Reading::VdacDiode, words);
                self.diode_tref + (pos5v() - vdiode - self.diode_vf) / self.diode_tcoef
            }
        }
    }

    /// Volts per DAC code on the bias outputs.
    pub fn volts_per_code(&self) -> f64 {
        50.0 * self.dac_vref / f64::from(1u32 << 14)
    }

    pub fn code_to_volts(&self, code: u16) -> f64 {
        f64::from(code) * self.volts_per_code()
    }

    /// Nearest DAC code for `volts`, or `None` if it is negative, not a
    /// number, or beyond full scale.
    pub fn volts_to_code(&self, volts: f64) -> Option<u16> {
        if !volts.is_finite() || volts < 0.0 {
            return None;
        }
        let code = (volts / self.volts_per_code() + 0.5).floor();
        if code > f64::from(MAX_CODE) {
            return None;
        }
        Some(code as u16)
    }
}

/// A value derived from the board's status words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reading {
    Tchip,
    Pos5V,
    Neg5V,
    Pos3_3V,
    Pos1_2V,
    Vsumref1,
    Vsumref2,
    Vgainmode,
    Gainmode,
    Vtherm1,
    Vtherm2,
    Tpreamp1,
    Tpreamp2,
    VdacHealth,
    VdacDiode,
    Tdac,
}

impl Reading {
    pub const ALL: [Reading; 16] = [
        Reading::Tchip,
        Reading::Pos5V,
        Reading::Neg5V,
        Reading::Pos3_3V,
        Reading::Pos1_2V,
        Reading::Vsumref1,
        Reading::Vsumref2,
        Reading::Vgainmode,
        Reading::Gainmode,
        Reading::Vtherm1,
        Reading::Vtherm2,
        Reading::Tpreamp1,
        Reading::Tpreamp2,
        Reading::VdacHealth,
        Reading::VdacDiode,
        Reading::Tdac,
    ];

    /// Relay verb that requests this reading.
    pub const fn verb(self) -> &'static str {
        match self {
            Reading::Tchip => "get_Tchip",
            Reading::Pos5V => "get_pos5Vpower",
            Reading::Neg5V => "get_neg5Vpower",
            Reading::Pos3_3V => "get_pos3_3Vpower",
            Reading::Pos1_2V => "get_pos1_2Vpower",
            Reading::Vsumref1 => "get_Vsumref_1",
            Reading::Vsumref2 => "get_Vsumref_2",
            Reading::Vgainmode => "get_Vgainmode",
            Reading::Gainmode => "get_gainmode",
            Reading::Vtherm1 => "get_Vtherm_1",
            Reading::Vtherm2 => "get_Vtherm_2",
            Reading::Tpreamp1 => "get_Tpreamp_1",
            Reading::Tpreamp2 => "get_Tpreamp_2",
            Reading::VdacHealth => "get_VDAChealth",
            Reading::VdacDiode => "get_VDACdiode",
            Reading::Tdac => "get_TDAC",
        }
    }

    pub fn from_verb(verb: &str) -> Option<Reading> {
        Reading::ALL.into_iter().find(|r| r.verb() == verb)
    }

    /// Human label for reports.
    pub const fn label(self) -> &'static str {
        match self {
            Reading::Tchip => "chip temperature",
            Reading::Pos5V => "+5V power",
            Reading::Neg5V => "-5V power",
            Reading::Pos3_3V => "+3.3V power",
            Reading::Pos1_2V => "+1.2V power",
            Reading::Vsumref1 => "preamp 1 sumref",
            Reading::Vsumref2 => "preamp 2 sumref",
            Reading::Vgainmode => "gainmode",
            Reading::Gainmode => "gain mode",
            Reading::Vtherm1 => "preamp 1 thermistor",
            Reading::Vtherm2 => "preamp 2 thermistor",
            Reading::Tpreamp1 => "preamp 1 temperature",
            Reading::Tpreamp2 => "preamp 2 temperature",
            Reading::VdacHealth => "DAC health level",
            Reading::VdacDiode => "DAC diode",
            Reading::Tdac => "DAC temperature",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Reading::Tchip | Reading::Tpreamp1 | Reading::Tpreamp2 | Reading::Tdac => "C",
            Reading::Gainmode => "",
            _ => "V",
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for Reading {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reading::from_verb(s).ok_or_else(|| format!("unknown reading {s:?}"))
    }
}

/// Preamp gain mode as reported by the gain-mode monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainMode {
    Low,
    High,
    Undefined,
}

impl GainMode {
    pub fn from_volts(volts: f64) -> Self {
        if volts > 4.9 && volts < 5.1 {
            GainMode::Low
        } else if volts > 9.9 && volts < 10.1 {
            GainMode::High
        } else {
            GainMode::Undefined
        }
    }

    /// Numeric form used on the relay wire.
    pub const fn code(self) -> i32 {
        match self {
            GainMode::Low => 0,
            GainMode::High => 1,
            GainMode::Undefined => -1,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => GainMode::Low,
            1 => GainMode::High,
            _ => GainMode::Undefined,
        }
    }
}

impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GainMode::Low => "low",
            GainMode::High => "high",
            GainMode::Undefined => "undefined",
        })
    }
}
