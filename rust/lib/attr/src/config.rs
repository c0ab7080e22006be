/// Options applied when a type is built.
///
/// Carried by [`TypeBuilder`](crate::TypeBuilder); types built with the
/// default configuration bind magic methods and check property getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Bind methods named `_default_<attr>`, `_validate_<attr>`,
    /// `_post_validate_<attr>`, `_post_getattr_<attr>`,
    /// `_post_setattr_<attr>`, `_getstate_<attr>` and `_observe_<attr>`
    /// to the matching attribute.
    pub bind_magic_methods: bool,

    /// Reject properties that have neither a getter function nor a
    /// `_get_<attr>` method.
    pub check_property_getters: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            bind_magic_methods: true,
            check_property_getters: true,
        }
    }
}

impl BuildConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--no-magic-methods`
    /// - `--no-property-check`
    pub fn from_args(args: &[String]) -> Self {
        let mut config = BuildConfig::default();

        for arg in args {
            match arg.as_str() {
                "--no-magic-methods" => config.bind_magic_methods = false,
                "--no-property-check" => config.check_property_getters = false,
                _ => {}
            }
        }

        config
    }
}
