//! Per-pipe settings interpreted by the pipe decorators.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Message, PipeLineSession};
use crate::resources::{Locker, Propagation};

/// Settings of one pipe.
///
/// Everything here is applied by the engine around the pipe; the pipe itself
/// never sees these values.
#[derive(Clone, Default)]
pub struct PipeSettings {
    /// Maximum number of concurrent invocations of this pipe.
    pub max_threads: Option<usize>,
    /// Lock held while the pipe runs.
    pub locker: Option<Arc<dyn Locker>>,
    /// Transaction propagation.
    pub transaction_attribute: Propagation,
    /// Transaction timeout.
    pub transaction_timeout: Option<Duration>,
    /// Runs slower than this raise a long-duration event.
    pub duration_threshold: Option<Duration>,
    /// Record input and output size distributions.
    pub size_statistics: bool,

    /// Truncate character data longer than this in the result.
    pub chomp_char_size: Option<usize>,
    /// Move the content of this element into the session.
    pub element_to_move: Option<String>,
    /// Session key for moved element content; defaults to the element name.
    pub element_to_move_session_key: Option<String>,
    /// Replace `{sessionKey:..}` references in the result with session values.
    pub restore_moved_elements: bool,

    /// Take the input from this session key instead of the current message.
    pub get_input_from_session_key: Option<String>,
    /// Take this fixed value as input instead of the current message.
    pub get_input_from_fixed_value: Option<String>,
    /// Store the result under this session key.
    pub store_result_in_session_key: Option<String>,
    /// Pass the input on instead of the result.
    pub preserve_input: bool,
    /// Replace empty input with this value.
    pub empty_input_replacement: Option<String>,

    /// Skip the pipe if the input is empty.
    pub skip_on_empty_input: bool,
    /// Run only if this session key is present.
    pub only_if_session_key: Option<String>,
    /// Run only if the session key has this value.
    pub only_if_value: Option<String>,
    /// Skip the pipe if this session key is present.
    pub unless_session_key: Option<String>,
    /// Skip the pipe if the session key has this value.
    pub unless_value: Option<String>,

    /// Write an audit line to the security log after every run.
    pub write_to_sec_log: bool,
    /// Session keys whose values are included in the audit line.
    pub sec_log_session_keys: Vec<String>,
    /// Log the message passed to this pipe; overrides the engine setting.
    pub log_intermediary_results: Option<bool>,
    /// Mask matches of this pattern in logged messages.
    pub hide_regex: Option<String>,
}

impl PipeSettings {
    /// Creates default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits concurrent invocations.
    #[must_use]
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    /// Holds a lock while the pipe runs.
    #[must_use]
    pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
        self.locker = Some(locker);
        self
    }

    /// Sets the transaction propagation and timeout.
    #[must_use]
    pub fn with_transaction(mut self, propagation: Propagation, timeout: Option<Duration>) -> Self {
        self.transaction_attribute = propagation;
        self.transaction_timeout = timeout;
        self
    }

    /// Raises a long-duration event for runs slower than `threshold`.
    #[must_use]
    pub fn with_duration_threshold(mut self, threshold: Duration) -> Self {
        self.duration_threshold = Some(threshold);
        self
    }

    /// Records input and output size distributions.
    #[must_use]
    pub fn with_size_statistics(mut self, enabled: bool) -> Self {
        self.size_statistics = enabled;
        self
    }

    /// Truncates long character data in the result.
    #[must_use]
    pub fn with_chomp_char_size(mut self, size: usize) -> Self {
        self.chomp_char_size = Some(size);
        self
    }

    /// Moves the content of an element into the session.
    #[must_use]
    pub fn with_element_to_move(mut self, element: impl Into<String>, session_key: Option<String>) -> Self {
        self.element_to_move = Some(element.into());
        self.element_to_move_session_key = session_key;
        self
    }

    /// Restores moved elements in the result.
    #[must_use]
    pub fn with_restore_moved_elements(mut self, restore: bool) -> Self {
        self.restore_moved_elements = restore;
        self
    }

    /// Reads the input from a session key.
    #[must_use]
    pub fn with_input_from_session_key(mut self, key: impl Into<String>) -> Self {
        self.get_input_from_session_key = Some(key.into());
        self
    }

    /// Uses a fixed input.
    #[must_use]
    pub fn with_input_from_fixed_value(mut self, value: impl Into<String>) -> Self {
        self.get_input_from_fixed_value = Some(value.into());
        self
    }

    /// Stores the result in a session key.
    #[must_use]
    pub fn with_store_result_in_session_key(mut self, key: impl Into<String>) -> Self {
        self.store_result_in_session_key = Some(key.into());
        self
    }

    /// Passes the input on instead of the result.
    #[must_use]
    pub fn with_preserve_input(mut self, preserve: bool) -> Self {
        self.preserve_input = preserve;
        self
    }

    /// Replaces empty input.
    #[must_use]
    pub fn with_empty_input_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.empty_input_replacement = Some(replacement.into());
        self
    }

    /// Skips the pipe on empty input.
    #[must_use]
    pub fn with_skip_on_empty_input(mut self, skip: bool) -> Self {
        self.skip_on_empty_input = skip;
        self
    }

    /// Runs only if `key` is present, and equals `value` when given.
    #[must_use]
    pub fn with_only_if(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.only_if_session_key = Some(key.into());
        self.only_if_value = value;
        self
    }

    /// Skips the pipe if `key` is present, and equals `value` when given.
    #[must_use]
    pub fn with_unless(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.unless_session_key = Some(key.into());
        self.unless_value = value;
        self
    }

    /// Writes an audit line with the given session keys after every run.
    #[must_use]
    pub fn with_sec_log(mut self, session_keys: Vec<String>) -> Self {
        self.write_to_sec_log = true;
        self.sec_log_session_keys = session_keys;
        self
    }

    /// Overrides intermediary result logging.
    #[must_use]
    pub fn with_log_intermediary_results(mut self, enabled: bool) -> Self {
        self.log_intermediary_results = Some(enabled);
        self
    }

    /// Masks matches of `pattern` in logged messages.
    #[must_use]
    pub fn with_hide_regex(mut self, pattern: impl Into<String>) -> Self {
        self.hide_regex = Some(pattern.into());
        self
    }

    /// Returns true if the skip conditions say this input should bypass the pipe.
    #[must_use]
    pub fn skip_pipe(&self, input: &Message, session: &PipeLineSession) -> bool {
        if self.skip_on_empty_input && input.is_empty() {
            return true;
        }
        if let Some(key) = &self.only_if_session_key {
            let matches = match (session.get(key), &self.only_if_value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value), Some(expected)) => value.as_string().as_deref() == Some(expected.as_str()),
            };
            if !matches {
                return true;
            }
        }
        if let Some(key) = &self.unless_session_key {
            let matches = match (session.get(key), &self.unless_value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value), Some(expected)) => value.as_string().as_deref() == Some(expected.as_str()),
            };
            if matches {
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for PipeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeSettings")
            .field("max_threads", &self.max_threads)
            .field("locker", &self.locker.as_ref().map(|l| l.object_id().to_string()))
            .field("transaction_attribute", &self.transaction_attribute)
            .field("transaction_timeout", &self.transaction_timeout)
            .field("duration_threshold", &self.duration_threshold)
            .field("get_input_from_session_key", &self.get_input_from_session_key)
            .field("store_result_in_session_key", &self.store_result_in_session_key)
            .field("preserve_input", &self.preserve_input)
            .finish_non_exhaustive()
    }
}
