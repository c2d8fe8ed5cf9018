use kube::CustomResourceExt;
use tenant_observer::crd::TenantInfo;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&TenantInfo::crd())?);
    Ok(())
}
