//! Names shared between generated code and the runtime that executes it.

/// Sentinel type handlers return to steer the generated dispatch block.
pub const RESULT_CLASS: &str = "hookweave/runtime/HookResult";
pub const RESULT_DESC: &str = "Lhookweave/runtime/HookResult;";

/// `()I`: 0 continue, 1 override, 2 jump.
pub const RESULT_TAG: (&str, &str) = ("tag", "()I");
pub const RESULT_VALUE: (&str, &str) = ("value", "()Ljava/lang/Object;");
pub const RESULT_JUMP_INDEX: (&str, &str) = ("jumpIndex", "()I");
pub const RESULT_HAS_CAPTURE: (&str, &str) = ("hasCapture", "(I)Z");
pub const RESULT_CAPTURED: (&str, &str) = ("captured", "(I)Ljava/lang/Object;");
pub const RESULT_CAPTURE: (&str, &str) = ("capture", "(ILjava/lang/Object;)V");

/// Static factories bytecode handlers use to build sentinels.
pub const RESULT_PROCEED: (&str, &str) = ("proceed", "()Lhookweave/runtime/HookResult;");
pub const RESULT_OVERRIDE: (&str, &str) = ("override", "(Ljava/lang/Object;)Lhookweave/runtime/HookResult;");
pub const RESULT_JUMP: (&str, &str) = ("jump", "(I)Lhookweave/runtime/HookResult;");

/// Thread-local reentrancy flag consulted when `avoid-recursion` is set.
pub const GUARD_CLASS: &str = "hookweave/runtime/ReentryGuard";
pub const GUARD_ENTER: (&str, &str) = ("enter", "()Z");
pub const GUARD_EXIT: (&str, &str) = ("exit", "()V");

/// Bootstrap for lazily bound handler call sites.
pub const BOOTSTRAP_CLASS: &str = "hookweave/runtime/HandlerBootstrap";
pub const BOOTSTRAP_METHOD: (&str, &str) = (
    "bind",
    "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;Ljava/lang/String;)Ljava/lang/invoke/CallSite;",
);

/// Prefix given to the native sibling created by native-method rollback.
pub const NATIVE_PREFIX: &str = "$hookweave$";

/// Thrown when a jump index falls outside the declared jump targets.
pub const BAD_JUMP_EXCEPTION: &str = "java/lang/IllegalStateException";

/// Tag values returned by `HookResult.tag()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResultTag {
    Continue = 0,
    Override = 1,
    Jump = 2,
}

impl ResultTag {
    pub const fn value(self) -> i32 {
        self as i32
    }
}

/// Name of the native sibling for `name`.
pub fn native_sibling_name(name: &str) -> String {
    format!("{}{}", NATIVE_PREFIX, name)
}

/// Maps a renamed native sibling back to the symbol the native library exports.
pub fn native_symbol_name(name: &str) -> &str {
    name.strip_prefix(NATIVE_PREFIX).unwrap_or(name)
}
