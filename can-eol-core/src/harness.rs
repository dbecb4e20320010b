//! Wiring-harness continuity evaluation
//!
//! Each case drives one digital output and expects a known set of digital
//! inputs to follow it. Inputs are sampled several times and majority-voted
//! per bit. The I/O card itself is a collaborator behind [`DigitalIo`].

use crate::config::{load_document, DocumentFormat};
use crate::types::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Error tag for a failed output write
pub const ERROR_DO_WRITE: &str = "do_write_failed";
/// Error tag for a failed input read
pub const ERROR_DI_READ: &str = "di_read_failed";

/// Digital I/O card
pub trait DigitalIo {
    /// Number of input channels, at most 32
    fn input_channels(&self) -> u8;

    /// Set one output channel to the given logic level
    fn write_output(&mut self, channel: u8, level: bool) -> Result<()>;

    /// Read all inputs as a bit mask (bit N = input channel N)
    fn read_inputs(&mut self) -> Result<u32>;
}

/// One continuity case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessCase {
    pub id: String,
    /// Output channel driven for this case
    pub source: u8,
    /// Input channels that must follow the source
    #[serde(default)]
    pub targets: Vec<u8>,
    #[serde(default = "default_test_type")]
    pub test_type: String,
    #[serde(default, alias = "circuit_Num")]
    pub circuit_num: Option<u32>,
    #[serde(default, alias = "PN")]
    pub part_numbers: Option<Vec<u64>>,
    #[serde(default)]
    pub note: String,
}

fn default_test_type() -> String {
    "continuity".to_string()
}

#[derive(Debug, Deserialize)]
struct HarnessDocument {
    #[serde(default)]
    loops: Vec<HarnessCase>,
}

/// Load harness cases from the `loops` list of a YAML or JSON file
pub fn load_cases(path: &Path) -> Result<Vec<HarnessCase>> {
    let document: HarnessDocument = load_document(path)?;
    log::info!("Loaded {} wiring-harness cases from {:?}", document.loops.len(), path);
    Ok(document.loops)
}

/// Parse harness cases from a YAML string
pub fn cases_from_yaml_str(content: &str) -> Result<Vec<HarnessCase>> {
    let document: HarnessDocument = DocumentFormat::Yaml.parse(content)?;
    Ok(document.loops)
}

/// Outcome of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessResult {
    pub case_id: String,
    pub timestamp: DateTime<Local>,
    pub source_channel: u8,
    pub expected_targets: Vec<u8>,
    /// Voted input mask; `None` when the inputs could not be read
    pub measured_mask: Option<u32>,
    pub missing_on: Vec<u8>,
    pub unexpected_on: Vec<u8>,
    pub passed: bool,
    pub circuit_num: Option<u32>,
    pub note: String,
    pub error: Option<String>,
}

/// Aggregate of a harness run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<HarnessResult>,
}

impl HarnessSummary {
    pub fn new(results: Vec<HarnessResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Tester settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessSettings {
    /// Wait after driving the output
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Input samples per case, majority-voted
    #[serde(default = "default_samples")]
    pub samples: u32,
    /// Gap between samples
    #[serde(default = "default_sample_gap_ms")]
    pub sample_gap_ms: u64,
    /// Only the targets may be on
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Logic 1 means on, for outputs and inputs alike
    #[serde(default = "default_true")]
    pub active_high: bool,
}

fn default_settle_ms() -> u64 {
    60
}

fn default_samples() -> u32 {
    3
}

fn default_sample_gap_ms() -> u64 {
    8
}

fn default_true() -> bool {
    true
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            samples: default_samples(),
            sample_gap_ms: default_sample_gap_ms(),
            strict: true,
            active_high: true,
        }
    }
}

/// Runs continuity cases against a digital I/O card
pub struct HarnessTester<D: DigitalIo> {
    io: D,
    settings: HarnessSettings,
}

impl<D: DigitalIo> HarnessTester<D> {
    pub fn new(io: D, settings: HarnessSettings) -> Self {
        Self { io, settings }
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Give the I/O card back
    pub fn into_inner(self) -> D {
        self.io
    }

    /// Read the inputs `samples` times and vote each bit
    pub fn read_stable_inputs(&mut self) -> Result<u32> {
        let samples = self.settings.samples.max(1);
        let channels = self.io.input_channels().min(32) as usize;
        let mut counts = vec![0u32; channels];

        for i in 0..samples {
            let mask = self.io.read_inputs()?;
            for (ch, count) in counts.iter_mut().enumerate() {
                if (mask >> ch) & 1 == 1 {
                    *count += 1;
                }
            }
            if i + 1 < samples {
                sleep_ms(self.settings.sample_gap_ms);
            }
        }

        let threshold = samples / 2 + 1;
        Ok(counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count >= threshold)
            .fold(0u32, |mask, (ch, _)| mask | (1 << ch)))
    }

    /// Run one case
    pub fn run_case(&mut self, case: &HarnessCase) -> HarnessResult {
        log::info!(
            "Harness case {}: DO{} -> DI{:?} ({})",
            case.id,
            case.source,
            case.targets,
            case.test_type
        );

        let on = self.settings.active_high;
        if let Err(e) = self.io.write_output(case.source, on) {
            log::error!("[{}] Failed to drive DO{} on: {}", case.id, case.source, e);
            return self.failed_result(case, ERROR_DO_WRITE);
        }

        sleep_ms(self.settings.settle_ms);
        let measured = self.read_stable_inputs();

        // The source goes back off whatever the read did
        if let Err(e) = self.io.write_output(case.source, !on) {
            log::warn!("[{}] Failed to drive DO{} off: {}", case.id, case.source, e);
        }

        let mask = match measured {
            Ok(mask) => mask,
            Err(e) => {
                log::error!("[{}] Input read failed: {}", case.id, e);
                return self.failed_result(case, ERROR_DI_READ);
            }
        };

        // With active-low wiring a channel reads 0 when it is on
        let active_high = self.settings.active_high;
        let observed: Vec<u8> = (0..self.io.input_channels().min(32))
            .filter(|ch| ((mask >> ch) & 1 == 1) == active_high)
            .collect();

        let missing_on: Vec<u8> = case
            .targets
            .iter()
            .copied()
            .filter(|t| !observed.contains(t))
            .collect();
        let unexpected_on: Vec<u8> = if self.settings.strict {
            observed
                .iter()
                .copied()
                .filter(|ch| !case.targets.contains(ch))
                .collect()
        } else {
            Vec::new()
        };
        let passed = missing_on.is_empty() && unexpected_on.is_empty();

        log::info!(
            "[{}] mask=0x{:04X} missing={:?} unexpected={:?} -> {}",
            case.id,
            mask,
            missing_on,
            unexpected_on,
            if passed { "PASS" } else { "FAIL" }
        );

        HarnessResult {
            case_id: case.id.clone(),
            timestamp: Local::now(),
            source_channel: case.source,
            expected_targets: case.targets.clone(),
            measured_mask: Some(mask),
            missing_on,
            unexpected_on,
            passed,
            circuit_num: case.circuit_num,
            note: case.note.clone(),
            error: None,
        }
    }

    /// Run every case in order
    pub fn run_all(&mut self, cases: &[HarnessCase]) -> HarnessSummary {
        HarnessSummary::new(cases.iter().map(|case| self.run_case(case)).collect())
    }

    fn failed_result(&self, case: &HarnessCase, error: &str) -> HarnessResult {
        HarnessResult {
            case_id: case.id.clone(),
            timestamp: Local::now(),
            source_channel: case.source,
            expected_targets: case.targets.clone(),
            measured_mask: None,
            missing_on: Vec::new(),
            unexpected_on: Vec::new(),
            passed: false,
            circuit_num: case.circuit_num,
            note: case.note.clone(),
            error: Some(error.to_string()),
        }
    }
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Error;
    use std::collections::VecDeque;

    /// Loopback card: output N lights the inputs wired to it
    struct Loopback {
        wiring: Vec<(u8, Vec<u8>)>,
        driven: Option<u8>,
        noise: VecDeque<u32>,
        fail_write: bool,
        fail_read: bool,
        writes: Vec<(u8, bool)>,
    }

    impl Loopback {
        fn new(wiring: Vec<(u8, Vec<u8>)>) -> Self {
            Self {
                wiring,
                driven: None,
                noise: VecDeque::new(),
                fail_write: false,
                fail_read: false,
                writes: Vec::new(),
            }
        }
    }

    impl DigitalIo for Loopback {
        fn input_channels(&self) -> u8 {
            16
        }

        fn write_output(&mut self, channel: u8, level: bool) -> Result<()> {
            if self.fail_write {
                return Err(Error::DigitalIo("card offline".into()));
            }
            self.writes.push((channel, level));
            self.driven = if level { Some(channel) } else { None };
            Ok(())
        }

        fn read_inputs(&mut self) -> Result<u32> {
            if self.fail_read {
                return Err(Error::DigitalIo("read failed".into()));
            }
            let mut mask = self.noise.pop_front().unwrap_or(0);
            if let Some(src) = self.driven {
                for (out, ins) in &self.wiring {
                    if *out == src {
                        for i in ins {
                            mask |= 1 << i;
                        }
                    }
                }
            }
            Ok(mask)
        }
    }

    fn fast() -> HarnessSettings {
        HarnessSettings {
            settle_ms: 0,
            sample_gap_ms: 0,
            ..HarnessSettings::default()
        }
    }

    fn case(id: &str, source: u8, targets: Vec<u8>) -> HarnessCase {
        HarnessCase {
            id: id.into(),
            source,
            targets,
            test_type: default_test_type(),
            circuit_num: None,
            part_numbers: None,
            note: String::new(),
        }
    }

    #[test]
    fn test_passing_case_turns_source_off() {
        let mut tester = HarnessTester::new(Loopback::new(vec![(0, vec![1, 2])]), fast());
        let result = tester.run_case(&case("c1", 0, vec![1, 2]));
        assert!(result.passed);
        assert_eq!(result.measured_mask, Some(0b110));

        let io = tester.into_inner();
        assert_eq!(io.writes, vec![(0, true), (0, false)]);
    }

    #[test]
    fn test_missing_and_unexpected() {
        let mut tester = HarnessTester::new(Loopback::new(vec![(3, vec![1, 5])]), fast());
        let result = tester.run_case(&case("c2", 3, vec![1, 2]));
        assert!(!result.passed);
        assert_eq!(result.missing_on, vec![2]);
        assert_eq!(result.unexpected_on, vec![5]);
    }

    #[test]
    fn test_non_strict_ignores_extra_inputs() {
        let settings = HarnessSettings {
            strict: false,
            ..fast()
        };
        let mut tester = HarnessTester::new(Loopback::new(vec![(3, vec![1, 5])]), settings);
        assert!(tester.run_case(&case("c3", 3, vec![1])).passed);
    }

    #[test]
    fn test_majority_vote_filters_glitches() {
        let mut io = Loopback::new(vec![(0, vec![1])]);
        // Channel 7 glitches in one sample out of three
        io.noise = VecDeque::from(vec![1 << 7, 0, 0]);
        let mut tester = HarnessTester::new(io, fast());
        let result = tester.run_case(&case("c4", 0, vec![1]));
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut io = Loopback::new(vec![]);
        io.fail_write = true;
        let mut tester = HarnessTester::new(io, fast());
        let result = tester.run_case(&case("c5", 0, vec![1]));
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some(ERROR_DO_WRITE));
        assert_eq!(result.measured_mask, None);
    }

    #[test]
    fn test_read_failure_still_turns_source_off() {
        let mut io = Loopback::new(vec![(0, vec![1])]);
        io.fail_read = true;
        let mut tester = HarnessTester::new(io, fast());
        let result = tester.run_case(&case("c6", 0, vec![1]));
        assert_eq!(result.error.as_deref(), Some(ERROR_DI_READ));
        assert_eq!(tester.into_inner().writes, vec![(0, true), (0, false)]);
    }

    #[test]
    fn test_run_all_summary() {
        let mut tester = HarnessTester::new(Loopback::new(vec![(0, vec![1]), (1, vec![2])]), fast());
        let summary = tester.run_all(&[case("a", 0, vec![1]), case("b", 1, vec![3])]);
        assert_eq!((summary.total, summary.passed, summary.failed), (2, 1, 1));
        assert!(summary.to_json().unwrap().contains("\"case_id\": \"b\""));
    }

    /// Active-low card: inputs idle high and are pulled low by a source
    /// that is driven low
    struct PullDown {
        wiring: Vec<(u8, Vec<u8>)>,
        low: Option<u8>,
        writes: Vec<(u8, bool)>,
    }

    impl DigitalIo for PullDown {
        fn input_channels(&self) -> u8 {
            8
        }

        fn write_output(&mut self, channel: u8, level: bool) -> Result<()> {
            self.writes.push((channel, level));
            self.low = if level { None } else { Some(channel) };
            Ok(())
        }

        fn read_inputs(&mut self) -> Result<u32> {
            let mut mask = 0xFFu32;
            if let Some(src) = self.low {
                for (out, ins) in &self.wiring {
                    if *out == src {
                        for i in ins {
                            mask &= !(1 << i);
                        }
                    }
                }
            }
            Ok(mask)
        }
    }

    fn active_low() -> HarnessSettings {
        HarnessSettings {
            active_high: false,
            ..fast()
        }
    }

    #[test]
    fn test_active_low_passing_case() {
        let io = PullDown {
            wiring: vec![(2, vec![0, 3])],
            low: None,
            writes: Vec::new(),
        };
        let mut tester = HarnessTester::new(io, active_low());
        let result = tester.run_case(&case("low1", 2, vec![0, 3]));

        assert!(result.passed, "{:?}", result);
        assert_eq!(result.measured_mask, Some(0b1111_0110));
        // Driven low to switch on, released high afterwards
        assert_eq!(tester.into_inner().writes, vec![(2, false), (2, true)]);
    }

    #[test]
    fn test_active_low_missing_and_unexpected() {
        let io = PullDown {
            wiring: vec![(1, vec![4, 6])],
            low: None,
            writes: Vec::new(),
        };
        let mut tester = HarnessTester::new(io, active_low());
        let result = tester.run_case(&case("low2", 1, vec![4, 5]));

        assert!(!result.passed);
        assert_eq!(result.missing_on, vec![5]);
        assert_eq!(result.unexpected_on, vec![6]);
    }

    #[test]
    fn test_cases_from_yaml() {
        let yaml = r#"
loops:
  - id: L1
    source: 0
    targets: [1, 2]
    circuit_Num: 1204
    PN: [36666666]
  - id: L2
    source: 4
    note: ground strap
"#;
        let cases = cases_from_yaml_str(yaml).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].circuit_num, Some(1204));
        assert_eq!(cases[0].part_numbers, Some(vec![36666666]));
        assert_eq!(cases[1].test_type, "continuity");
        assert!(cases[1].targets.is_empty());
    }
}
