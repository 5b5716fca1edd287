//! Print the `Puller` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::CustomResourceExt;
use puller_controller::crd::Puller;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Puller::crd())?);
    Ok(())
}
