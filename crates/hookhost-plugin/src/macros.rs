//! Convenience macros for plugin development.

/// Builds the argument list for a hook emission.
///
/// # Example
/// ```rust,ignore
/// let outcomes = manager
///     .emit_hook("file:saved", hook_args!["/tmp/report.pdf", { "size": 1024 }])
///     .await;
/// ```
#[macro_export]
macro_rules! hook_args {
    () => {
        ::std::vec::Vec::<$crate::__serde_json::Value>::new()
    };
    ($($arg:tt),+ $(,)?) => {
        ::std::vec![$($crate::__serde_json::json!($arg)),+]
    };
}

/// Declares an in-process module from metadata and async hook closures.
///
/// # Example
/// ```rust,ignore
/// let export = plugin_module!(
///     name: "greeter",
///     version: "1.0.0",
///     hooks: {
///         "ping" => |_ctx, _args| async { Ok(json!("pong")) },
///     }
/// );
/// ```
#[macro_export]
macro_rules! plugin_module {
    (
        name: $name:expr
        $(, version: $version:expr)?
        $(, description: $desc:expr)?
        $(, dependencies: [$($dep:expr),* $(,)?])?
        , hooks: { $($hook:expr => $handler:expr),* $(,)? } $(,)?
    ) => {{
        let builder = $crate::exports::ModuleExport::builder().name($name);
        $(let builder = builder.version($version);)?
        $(let builder = builder.description($desc);)?
        $($(let builder = builder.dependency($dep);)*)?
        $(let builder = builder.hook_fn($hook, $handler);)*
        builder.build()
    }};
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    #[test]
    fn test_hook_args() {
        let empty = hook_args![];
        assert!(empty.is_empty());

        let args = hook_args!["a", 1, { "k": true }];
        assert_eq!(args, vec![json!("a"), json!(1), json!({"k": true})]);
    }

    #[test]
    fn test_plugin_module() {
        let export = plugin_module!(
            name: "greeter",
            version: "2.0.0",
            dependencies: ["storage"],
            hooks: {
                "ping" => |_ctx, _args| async { Ok(json!("pong")) },
            }
        );

        assert_eq!(export.declared_name(), Some("greeter"));
        assert_eq!(export.metadata["version"], json!("2.0.0"));
        assert_eq!(export.metadata["dependencies"], json!(["storage"]));
        assert_eq!(export.hooks.map(|h| h.len()), Some(1));
    }
}
