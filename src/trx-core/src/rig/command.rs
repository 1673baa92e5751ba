// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::str::FromStr;

use crate::radio::freq::Freq;
use crate::rig::response::RigError;
use crate::rig::state::{AgcSpeed, CwInput, Ft8Mode, Mode, RxOutput};
use crate::rig::{is_false, is_true};

/// One parsed line of the text control protocol.
///
/// Lines look like `key=value` (set), `key?` (query) or `status?`. Keys may
/// carry a receiver prefix, `r1:freq=12000`, where receivers count from 1.
#[derive(Debug, Clone, PartialEq)]
pub enum RigCommand {
    Status,
    Get { rx: Option<usize>, key: String },
    SetFreq(Freq),
    SetMode(Mode),
    SetPtt(bool),
    SetBfoOffset(i32),
    SetVolume(u8),
    SetInputVolume(u8),
    SetNotch(bool),
    SetNotchFreq(f32),
    SetNotchBandwidth(f32),
    SetAnr(bool),
    SetDsp(bool),
    SetNoiseThreshold(i32),
    SetNoiseInterval(u32),
    SetCompression(u8),
    SetTxMonitor(u8),
    SetPitch(u32),
    SetTxMode(Mode),
    SetTxFreq(f64),
    SetCwInput(CwInput),
    SetFt8Mode(Ft8Mode),
    Reset,
    SetRxFreq { rx: usize, hz: f64 },
    SetRxMode { rx: usize, mode: Mode },
    SetRxLow { rx: usize, hz: i32 },
    SetRxHigh { rx: usize, hz: i32 },
    SetRxAgc { rx: usize, speed: AgcSpeed },
    SetRxOutput { rx: usize, output: RxOutput },
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, RigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| RigError(format!("invalid value for {key}: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, RigError> {
    if is_true(value) {
        Ok(true)
    } else if is_false(value) {
        Ok(false)
    } else {
        Err(RigError(format!("invalid value for {key}: {value}")))
    }
}

/// Split an optional `r<n>:` prefix off a key, returning a 0-based index.
fn split_receiver(key: &str) -> Result<(Option<usize>, &str), RigError> {
    let Some((prefix, rest)) = key.split_once(':') else {
        return Ok((None, key));
    };
    let index = prefix
        .strip_prefix('r')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| RigError(format!("invalid receiver prefix: {prefix}")))?;
    Ok((Some(index - 1), rest))
}

impl FromStr for RigCommand {
    type Err = RigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RigError::from("empty command"));
        }

        if let Some(query) = line.strip_suffix('?') {
            let (rx, key) = split_receiver(query.trim())?;
            let key = key.trim().to_ascii_lowercase();
            if key == "status" && rx.is_none() {
                return Ok(RigCommand::Status);
            }
            return Ok(RigCommand::Get { rx, key });
        }

        let (key, value) = line
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .unwrap_or((line, ""));
        let (rx, key) = split_receiver(key)?;
        let key = key.to_ascii_lowercase();

        if let Some(rx) = rx {
            let cmd = match key.as_str() {
                "freq" => RigCommand::SetRxFreq {
                    rx,
                    hz: parse_value(&key, value)?,
                },
                "mode" => RigCommand::SetRxMode {
                    rx,
                    mode: parse_value(&key, value)?,
                },
                "low" => RigCommand::SetRxLow {
                    rx,
                    hz: parse_value(&key, value)?,
                },
                "high" => RigCommand::SetRxHigh {
                    rx,
                    hz: parse_value(&key, value)?,
                },
                "agc" => RigCommand::SetRxAgc {
                    rx,
                    speed: value.parse()?,
                },
                "output" => RigCommand::SetRxOutput {
                    rx,
                    output: value.parse()?,
                },
                _ => return Err(RigError(format!("unknown command: {key}"))),
            };
            return Ok(cmd);
        }

        let cmd = match key.as_str() {
            "freq" => RigCommand::SetFreq(Freq::new(parse_value(&key, value)?)),
            "mode" => RigCommand::SetMode(parse_value(&key, value)?),
            "tx" | "ptt" => RigCommand::SetPtt(parse_bool(&key, value)?),
            "bfo" => RigCommand::SetBfoOffset(parse_value(&key, value)?),
            "volume" => RigCommand::SetVolume(parse_value(&key, value)?),
            "input_volume" => RigCommand::SetInputVolume(parse_value(&key, value)?),
            "notch" => RigCommand::SetNotch(parse_bool(&key, value)?),
            "notch_freq" => RigCommand::SetNotchFreq(parse_value(&key, value)?),
            "notch_bw" => RigCommand::SetNotchBandwidth(parse_value(&key, value)?),
            "anr" => RigCommand::SetAnr(parse_bool(&key, value)?),
            "dsp" => RigCommand::SetDsp(parse_bool(&key, value)?),
            "noise_threshold" => RigCommand::SetNoiseThreshold(parse_value(&key, value)?),
            "noise_interval" => RigCommand::SetNoiseInterval(parse_value(&key, value)?),
            "comp" => RigCommand::SetCompression(parse_value(&key, value)?),
            "txmon" => RigCommand::SetTxMonitor(parse_value(&key, value)?),
            "pitch" => RigCommand::SetPitch(parse_value(&key, value)?),
            "tx_mode" => RigCommand::SetTxMode(parse_value(&key, value)?),
            "tx_freq" => RigCommand::SetTxFreq(parse_value(&key, value)?),
            "cw_input" => RigCommand::SetCwInput(value.parse()?),
            "ft8_mode" => RigCommand::SetFt8Mode(value.parse()?),
            "reset" => RigCommand::Reset,
            _ => return Err(RigError(format!("unknown command: {key}"))),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_sets() {
        assert_eq!(
            "freq=7074000".parse::<RigCommand>().unwrap(),
            RigCommand::SetFreq(Freq::new(7_074_000))
        );
        assert_eq!(
            "MODE = lsb".parse::<RigCommand>().unwrap(),
            RigCommand::SetMode(Mode::LSB)
        );
        assert_eq!(
            "tx=on".parse::<RigCommand>().unwrap(),
            RigCommand::SetPtt(true)
        );
        assert_eq!("reset".parse::<RigCommand>().unwrap(), RigCommand::Reset);
    }

    #[test]
    fn parses_receiver_prefix() {
        assert_eq!(
            "r1:freq=12000".parse::<RigCommand>().unwrap(),
            RigCommand::SetRxFreq { rx: 0, hz: 12000.0 }
        );
        assert_eq!(
            "r2:agc=fast".parse::<RigCommand>().unwrap(),
            RigCommand::SetRxAgc {
                rx: 1,
                speed: AgcSpeed::Fast
            }
        );
        assert!("r0:freq=100".parse::<RigCommand>().is_err());
        assert!("rx:freq=100".parse::<RigCommand>().is_err());
    }

    #[test]
    fn parses_queries() {
        assert_eq!(
            "status?".parse::<RigCommand>().unwrap(),
            RigCommand::Status
        );
        assert_eq!(
            "r3:mode?".parse::<RigCommand>().unwrap(),
            RigCommand::Get {
                rx: Some(2),
                key: "mode".into()
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!("".parse::<RigCommand>().is_err());
        assert!("warp=9".parse::<RigCommand>().is_err());
        assert!("volume=loud".parse::<RigCommand>().is_err());
        assert!("notch=maybe".parse::<RigCommand>().is_err());
    }
}
