use futures::FutureExt;
use serde::Deserialize;
use sprig_common::{
    CacheOptions, FsLoader, MountOptions, Package, PackageLoader, ResourceLoader, ServiceError,
    ServiceFuture, StaticPackage,
};
use sprig_reactive::Value;
use std::rc::Rc;
use tracing::debug;

/// Package file on disk: `{ "template": "...", "data": { ... } }`
#[derive(Debug, Default, Deserialize)]
struct PackageFile {
    template: Option<String>,
    data: Option<serde_json::Value>,
}

/// Loads packages as JSON files below the template directory
pub struct JsonPackages {
    loader: Rc<FsLoader>,
}

impl JsonPackages {
    pub fn new(loader: Rc<FsLoader>) -> Self {
        Self { loader }
    }
}

impl PackageLoader for JsonPackages {
    fn mount(&self, name: &str, url: &str, options: MountOptions) -> ServiceFuture<Rc<dyn Package>> {
        debug!(name, url, attributes = options.attributes.len(), "mounting package file");
        let text = self.loader.fetch_text(url, CacheOptions::default());
        let name = name.to_string();
        async move {
            let text = text.await?;
            let file: PackageFile =
                serde_json::from_str(&text).map_err(|err| ServiceError::package(&name, err.to_string()))?;

            let mut package = StaticPackage::new(name);
            if let Some(template) = file.template {
                package = package.with_template(template);
            }
            if let Some(data) = file.data {
                package = package.with_data(Value::from_json(&data));
            }
            Ok(Rc::new(package) as Rc<dyn Package>)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_mount_reads_package_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("card.json"),
            r#"{ "template": "<b>{{ $data.n }}</b>", "data": { "n": 1 } }"#,
        )
        .unwrap();
        let packages = JsonPackages::new(Rc::new(FsLoader::new(dir.path())));

        let package = block_on(packages.mount("card", "/card.json", MountOptions::default())).unwrap();
        assert_eq!(package.name(), "card");
        assert_eq!(package.template().as_deref(), Some("<b>{{ $data.n }}</b>"));
        assert!(package.data().is_some());
    }

    #[test]
    fn test_invalid_package_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "not json").unwrap();
        let packages = JsonPackages::new(Rc::new(FsLoader::new(dir.path())));

        let err = block_on(packages.mount("bad", "/bad.json", MountOptions::default()))
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::Package { .. }));
    }
}
