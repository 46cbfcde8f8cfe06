use std::fmt;

/// Where an error happened: the hook that was being applied and, once known,
/// the target class/method it was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Coordinates {
    pub hook: String,
    pub class: Option<String>,
    pub method: Option<String>,
}

impl Coordinates {
    pub fn hook(hook: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            class: None,
            method: None,
        }
    }

    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook '{}'", self.hook)?;
        match (&self.class, &self.method) {
            (Some(class), Some(method)) => write!(f, " -> {}.{}", class, method),
            (Some(class), None) => write!(f, " -> {}", class),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeaveError {
    /// Unusable hook declaration: unresolvable target, misplaced captures,
    /// receiver-less handler, descriptor mismatch, bad flag combination.
    Configuration { at: Coordinates, msg: String },
    /// A slice or jump anchor did not resolve to exactly one instruction.
    LocateAmbiguity {
        at: Coordinates,
        anchor: String,
        matches: usize,
    },
}

impl WeaveError {
    pub fn config(at: Coordinates, msg: impl Into<String>) -> Self {
        WeaveError::Configuration { at, msg: msg.into() }
    }

    pub fn coordinates(&self) -> &Coordinates {
        match self {
            WeaveError::Configuration { at, .. } | WeaveError::LocateAmbiguity { at, .. } => at,
        }
    }

    /// Fills in class/method coordinates that were not known where the error
    /// was raised.
    pub fn located(mut self, class: &str, method: &str) -> Self {
        let at = match &mut self {
            WeaveError::Configuration { at, .. } | WeaveError::LocateAmbiguity { at, .. } => at,
        };
        if at.class.is_none() {
            at.class = Some(class.to_string());
        }
        if at.method.is_none() {
            at.method = Some(method.to_string());
        }
        self
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, WeaveError::Configuration { .. })
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeaveError::Configuration { at, msg } => write!(f, "configuration error in {}: {}", at, msg),
            WeaveError::LocateAmbiguity { at, anchor, matches } => write!(
                f,
                "ambiguous match in {}: anchor {} matched {} instructions, expected exactly one",
                at, anchor, matches
            ),
        }
    }
}

impl std::error::Error for WeaveError {}

pub type WeaveResult<T> = Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_coordinates() {
        let err = WeaveError::config(Coordinates::hook("h1"), "no receiver").located("demo/A", "f()V");
        assert_eq!(err.to_string(), "configuration error in hook 'h1' -> demo/A.f()V: no receiver");

        let err = WeaveError::LocateAmbiguity {
            at: Coordinates::hook("h2").in_class("demo/B"),
            anchor: "slice".into(),
            matches: 2,
        };
        assert!(err.to_string().contains("matched 2 instructions"));
        assert!(!err.is_configuration());
    }
}
