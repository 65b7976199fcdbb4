//! Macros for defining typed resource references.

/// Defines a typed reference to one attribute of a resource.
///
/// This generates a newtype wrapper around [`LogicalId`](crate::LogicalId) with:
/// - An `ATTRIBUTE` constant (`None` means the resource's `Ref` value)
/// - `of()` to point at a resource
/// - `expr()` to convert into a template [`Expr`](crate::Expr)
/// - `Display` rendering the `Fn::Sub` placeholder
/// - `Serialize` rendering the CloudFormation intrinsic
///
/// # Example
///
/// ```ignore
/// define_ref!(VpcId, ref);
/// define_ref!(ClusterArn, "Arn");
///
/// let arn = ClusterArn::of(&cluster_logical_id);
/// assert_eq!(arn.to_string(), "${EcsCluster.Arn}");
/// ```
#[macro_export]
macro_rules! define_ref {
    (@define $name:ident, $attr:expr) => {
        /// A typed reference to a resource attribute resolved at deploy time.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::LogicalId);

        impl $name {
            /// The attribute read from the resource (`None` = `Ref`).
            pub const ATTRIBUTE: Option<&'static str> = $attr;

            /// Points at the given resource.
            #[must_use]
            pub fn of(resource: &$crate::LogicalId) -> Self {
                Self(resource.clone())
            }

            /// Returns the referenced resource's logical ID.
            #[must_use]
            pub fn resource(&self) -> &$crate::LogicalId {
                &self.0
            }

            /// Converts into a template expression.
            #[must_use]
            pub fn expr(&self) -> $crate::Expr {
                match Self::ATTRIBUTE {
                    Some(attr) => $crate::Expr::GetAtt(self.0.clone(), attr.to_string()),
                    None => $crate::Expr::Ref(self.0.clone()),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match Self::ATTRIBUTE {
                    Some(attr) => write!(f, "${{{}.{}}}", self.0, attr),
                    None => write!(f, "${{{}}}", self.0),
                }
            }
        }

        impl From<&$name> for $crate::Expr {
            fn from(r: &$name) -> Self {
                r.expr()
            }
        }

        impl From<$name> for $crate::Expr {
            fn from(r: $name) -> Self {
                r.expr()
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serde::Serialize::serialize(&self.expr(), serializer)
            }
        }
    };
    ($name:ident, ref) => {
        $crate::define_ref!(@define $name, None);
    };
    ($name:ident, $attr:literal) => {
        $crate::define_ref!(@define $name, Some($attr));
    };
}
