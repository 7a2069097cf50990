//! A global store of flags that can impact resolution and comparison.
//!
//! WARNING: Currently only supports a single consistent configuration amongst threads (i.e., cannot
//! have different configurations for different comparisons in the same process).

/// The global configuration store. Its fields are expected to be accessed across the program via
/// the global [`CONFIG`](static@CONFIG).
pub struct CompareConfig {
    /// Require bit-exact type equality (rather than same metatype and size) when deciding that two
    /// types match.
    pub exact_match: bool,
    /// Drop variables whose type has size 0 when resolving functions and programs.
    pub filter_zero_sized_variables: bool,
    /// Reject ground-truth address spaces where two varnodes occupy common bytes. If disabled, such
    /// overlaps are only logged.
    pub check_ground_truth_self_overlap: bool,
    /// Round the derived size of a struct without an explicit size up to the struct alignment.
    pub pad_struct_tail_to_alignment: bool,
}

impl CompareConfig {
    /// Internal method: sets up initialization
    #[allow(static_mut_refs)]
    fn from_initialized() -> Self {
        // Reading an uninitialized config (library use, tests) yields the defaults
        let init = unsafe { INTERNAL_CONFIG_INITIALIZER.take() };
        init.flatten().unwrap_or_default()
    }

    /// Initialize with the given command line configuration. Should only be called once, and should
    /// only be called from `main`.
    #[allow(static_mut_refs)]
    pub fn initialize(command_line_config: Vec<CommandLineCompareConfig>) {
        let prev = unsafe { INTERNAL_CONFIG_INITIALIZER.replace(Some(command_line_config.into())) };
        assert!(prev.is_some(), "Performed double initialization");
        lazy_static::initialize(&CONFIG);
    }
}

/// Internal initialization detail.
static mut INTERNAL_CONFIG_INITIALIZER: Option<Option<CompareConfig>> = Some(None);

lazy_static::lazy_static! {
    /// The global configuration store
    pub static ref CONFIG: CompareConfig = CompareConfig::from_initialized();
}

#[derive(clap::ArgEnum, Clone, Debug)]
/// Comparison configuration parameters
pub enum CommandLineCompareConfig {
    EnableExactTypeMatching,
    DisableZeroSizedVariableFiltering,
    DisableGroundTruthSelfOverlapCheck,
    DisableStructTailPadding,
}

impl Default for CompareConfig {
    fn default() -> Self {
        CompareConfig {
            exact_match: false,
            filter_zero_sized_variables: true,
            check_ground_truth_self_overlap: true,
            pad_struct_tail_to_alignment: true,
        }
    }
}

impl From<Vec<CommandLineCompareConfig>> for CompareConfig {
    fn from(v: Vec<CommandLineCompareConfig>) -> Self {
        use CommandLineCompareConfig::*;
        let mut r = CompareConfig::default();
        for v in v {
            match v {
                EnableExactTypeMatching => {
                    r.exact_match = true;
                }
                DisableZeroSizedVariableFiltering => {
                    r.filter_zero_sized_variables = false;
                }
                DisableGroundTruthSelfOverlapCheck => {
                    r.check_ground_truth_self_overlap = false;
                }
                DisableStructTailPadding => {
                    r.pad_struct_tail_to_alignment = false;
                }
            }
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_toggles() {
        let c: CompareConfig = vec![
            CommandLineCompareConfig::EnableExactTypeMatching,
            CommandLineCompareConfig::DisableStructTailPadding,
        ]
        .into();
        assert!(c.exact_match);
        assert!(!c.pad_struct_tail_to_alignment);
        assert!(c.filter_zero_sized_variables);
        assert!(c.check_ground_truth_self_overlap);
    }
}
