use kube::CustomResourceExt;
fn main() -> anyhow::Result<()> {
    let documents = vec![acme_provider::resources::bucket::Bucket::crd()];

    for document in documents {
        print!("---\n");
        print!("{}", serde_yaml::to_string(&document)?);
    }
    Ok(())
}
