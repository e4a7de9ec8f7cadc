pub mod error;
pub mod gate;
pub mod loader;
pub mod model;
pub mod navigation;
pub mod packages;
pub mod result;
pub mod rules;
pub mod viewport;

pub use error::*;
pub use gate::Gate;
pub use loader::{CacheOptions, FsLoader, MemoryLoader, ResourceLoader};
pub use model::{MemoryModel, Model, RefreshHandler};
pub use navigation::{LocationHandler, MemoryHistory, Navigator};
pub use packages::{
    package_name_from_url, EventHandler, FilterFn, MemoryPackages, MountOptions, Package,
    PackageLoader, StaticPackage,
};
pub use result::*;
pub use rules::{parse_rules, Rule, RuleCall, RuleRegistry};
pub use viewport::{Rect, ScrollHandler, ScrollId, StaticViewport, Viewport};
