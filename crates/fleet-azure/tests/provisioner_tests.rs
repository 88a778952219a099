use fleet_azure::AzureCli;
use fleet_core::config::Config;
use fleet_core::executor::Provisioner;

const CONFIG: &str = r#"
resource_group: qwerty1234567
executors: 3
jobs:
  executable: /opt/compas/COMPAS
  commands_file: commands.txt
"#;

#[test]
fn test_executors_named_after_group() {
    let config = Config::from_yaml(CONFIG).unwrap();
    let cli = AzureCli::new(&config);

    assert_eq!(cli.resource_group(), "qwerty1234567");
    let vm = cli.executor(2);
    assert_eq!(vm.name(), "qwerty1234567vm2");
    // Nothing is known about the machine until it has been launched.
    assert_eq!(vm.address().display_address(), None);
}
