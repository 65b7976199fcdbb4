//! End-to-end happy path test.
//!
//! Walks the operator flow without the network:
//!
//! 1. Write a settings file and load it with environment overrides
//! 2. Read credentials from the environment
//! 3. Synthesize and write the template and manifest
//! 4. Read both artifacts back and cross-check them
//! 5. Render the controller's configuration-as-code file
//!
//! ## Running
//!
//! ```bash
//! cargo test -p jecs-e2e --test happy_path
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs;

use jecs_stack::stack::MANIFEST_FILE;
use jecs_stack::{synthesize, CascRenderer, CascVariables, Credentials, Settings, StackConfig};
use jecs_testing::{
    credential_env, settings_file, write_file, SAMPLE_CASC_TEMPLATE, SAMPLE_SETTINGS_INI,
};
use serde_json::Value;

#[test]
fn e2e_happy_path() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jecs_stack=debug".into()),
        )
        .with_test_writer()
        .try_init();

    // Settings file, with the image tag pinned from the environment.
    let (dir, path) = settings_file(SAMPLE_SETTINGS_INI).unwrap();
    let overrides = HashMap::from([("JECS_IMAGE_TAG".to_string(), "build-17".to_string())]);
    let (settings, tags) = Settings::load(&path, Some(overrides)).unwrap();
    assert_eq!(settings.image_tag, "build-17");

    let env = credential_env();
    let credentials = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
    let mut config = StackConfig::new(settings, credentials).unwrap();
    if let Some(tags) = tags {
        config = config.with_tags(tags);
    }

    // Synthesize and write artifacts.
    let stack = synthesize(&config).unwrap();
    let out = dir.path().join("cdk.out");
    let artifacts = stack.write_artifacts(&out).unwrap();
    assert_eq!(artifacts.manifest, out.join(MANIFEST_FILE));

    let template: Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.template).unwrap()).unwrap();
    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.manifest).unwrap()).unwrap();

    // Every resource in the template appears exactly once in the order.
    let resources: BTreeSet<&str> = template["Resources"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    let order: Vec<&str> = manifest["order"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(order.len(), resources.len());
    assert_eq!(order.iter().copied().collect::<BTreeSet<_>>(), resources);
    assert_eq!(manifest["resource_count"], resources.len());
    assert_eq!(manifest["template_hash"], stack.hash().as_str());
    assert_eq!(
        manifest["components"]["controller"],
        serde_json::json!(["agents", "cluster", "codebuild", "network"])
    );

    // Dependencies are declared before their dependents.
    let position = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(position("NetworkVpc") < position("ClusterNamespace"));
    assert!(position("NetworkPrivateSubnet1") < position("ClusterFileSystemMountTarget1"));
    assert!(position("ClusterExecLogGroup") < position("ClusterCluster"));
    assert!(position("ClusterCluster") < position("ControllerService"));
    assert!(position("ControllerTaskRolePolicy") < position("ControllerService"));

    // The pinned image tag reaches the agent images.
    let simple = stack.agents().image("simple").unwrap().value().to_string();
    assert!(simple.ends_with(":build-17"), "{simple}");

    // Render the configuration-as-code file as the controller would.
    let template_path = write_file(dir.path(), "jenkins.yaml.hbs", SAMPLE_CASC_TEMPLATE).unwrap();
    let renderer = CascRenderer::from_file(&template_path).unwrap();
    let variables = CascVariables::from_controller(stack.controller().environment());
    let rendered = renderer.render(&variables).unwrap();

    assert!(rendered.contains("systemMessage: \"jenkins controller in us-west-2\""));
    assert!(rendered.contains("projectName: \"${CodebuildProject}\""));
    assert!(rendered.contains("owner: \"voyager\""));
    assert_eq!(rendered, renderer.render(&variables).unwrap());
}
