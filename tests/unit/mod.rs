// Test code is allowed to panic on failure
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

//! Unit tests for vault-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the public API
//! of individual components in isolation.

mod config_tests {
    use std::time::Duration;

    use clap::Parser;
    use vault_operator::config::{Settings, parse_duration};

    #[test]
    fn test_defaults() {
        let settings = Settings::try_parse_from(["vault-operator"]).unwrap();
        assert_eq!(settings.sync_period, Duration::from_secs(30));
        assert!(!settings.verbose);
        assert_eq!(settings.health_probe_bind_address.port(), 8080);
        assert_eq!(settings.metrics_bind_address(), "0.0.0.0:8383");
        assert_eq!(settings.lock_name, "vault-operator-lock");
        assert_eq!(settings.lease_ttl, Duration::from_secs(15));
        assert_eq!(settings.lease_renew_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_flags() {
        let settings = Settings::try_parse_from([
            "vault-operator",
            "--sync-period",
            "1m",
            "--verbose",
            "--metrics-port",
            "9090",
            "--operator-name",
            "vault",
        ])
        .unwrap();
        assert_eq!(settings.sync_period, Duration::from_secs(60));
        assert!(settings.verbose);
        assert_eq!(settings.metrics_bind_address(), "0.0.0.0:9090");
        assert_eq!(settings.operator_name, "vault");
    }

    #[test]
    fn test_rejects_bad_sync_period() {
        assert!(Settings::try_parse_from(["vault-operator", "--sync-period", "0s"]).is_err());
        assert!(Settings::try_parse_from(["vault-operator", "--sync-period", "30"]).is_err());
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
    }
}

mod namespace_tests {
    use vault_operator::namespace::{
        NamespaceDiscoveryError, NamespaceResolver, ScopeDescriptor, ServiceAccountNamespace,
        WatchNamespaceSource,
    };

    struct Fixed(Option<&'static str>);

    impl WatchNamespaceSource for Fixed {
        fn discover(&self) -> Result<String, NamespaceDiscoveryError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| NamespaceDiscoveryError::NotSet("WATCH_NAMESPACE".to_string()))
        }
    }

    #[test]
    fn test_precedence() {
        let resolver =
            NamespaceResolver::with_discovery(Some("team-a".to_string()), Fixed(Some("ops-ns")));
        assert_eq!(resolver.resolve().as_str(), "team-a");

        let resolver = NamespaceResolver::with_discovery(None, Fixed(Some("ops-ns")));
        assert_eq!(resolver.resolve().as_str(), "ops-ns");

        let resolver = NamespaceResolver::with_discovery(Some(String::new()), Fixed(None));
        assert!(resolver.resolve().is_cluster_wide());
    }

    #[test]
    fn test_scope_descriptor() {
        assert_eq!(ScopeDescriptor::cluster_wide().namespace(), None);
        assert_eq!(ScopeDescriptor::cluster_wide().as_str(), "");
        assert_eq!(ScopeDescriptor::cluster_wide().to_string(), "cluster-wide");
        assert_eq!(ScopeDescriptor::namespaced("vault").namespace(), Some("vault"));
    }

    #[test]
    fn test_missing_service_account_file() {
        let source = ServiceAccountNamespace::new("/nonexistent/vault-operator/namespace");
        assert!(source.discover().is_err());
    }
}

mod lifecycle_tests {
    use vault_operator::manager::{LifecycleStateMachine, ManagerEvent, ManagerPhase};

    #[test]
    fn test_valid_events() {
        let sm = LifecycleStateMachine::new();
        assert_eq!(
            sm.valid_events(ManagerPhase::Constructed),
            vec![ManagerEvent::RegisterScheme, ManagerEvent::Fail]
        );
        assert_eq!(
            sm.valid_events(ManagerPhase::Running),
            vec![ManagerEvent::Stop, ManagerEvent::Fail]
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ManagerPhase::SchemeReady.to_string(), "SchemeReady");
        assert_eq!(ManagerPhase::default(), ManagerPhase::Unconstructed);
        assert_eq!(ManagerEvent::RegisterControllers.to_string(), "RegisterControllers");
    }
}

mod manager_tests {
    use std::time::Duration;

    use vault_operator::crd::{Apis, Vault};
    use vault_operator::manager::{
        AddToManager, ControllerError, Manager, ManagerConfig, ManagerError, ManagerPhase,
    };
    use vault_operator::namespace::ScopeDescriptor;

    struct NothingToRegister;

    impl AddToManager for NothingToRegister {
        fn add_to_manager(&self, manager: &mut Manager) -> Result<(), ControllerError> {
            if manager.scheme().recognizes::<Vault>() {
                Ok(())
            } else {
                Err(ControllerError::TypeNotRegistered("Vault".to_string()))
            }
        }
    }

    fn manager() -> Manager {
        Manager::new(ManagerConfig::new(
            ScopeDescriptor::cluster_wide(),
            Duration::from_secs(30),
            "127.0.0.1:0",
        ))
        .unwrap()
    }

    #[test]
    fn test_registration_order() {
        let mut manager = manager();
        assert!(matches!(
            manager.register_controllers(&NothingToRegister),
            Err(ManagerError::InvalidTransition { .. })
        ));

        manager.register_scheme(&Apis).unwrap();
        assert!(manager.scheme().recognizes::<Vault>());
        manager.register_controllers(&NothingToRegister).unwrap();
        assert_eq!(manager.phase(), ManagerPhase::ControllersReady);

        // Each step runs once per manager
        assert!(manager.register_scheme(&Apis).is_err());
    }

    #[test]
    fn test_config_from_settings() {
        use clap::Parser;
        use vault_operator::config::Settings;

        let settings =
            Settings::try_parse_from(["vault-operator", "--metrics-host", "127.0.0.1"]).unwrap();
        let config =
            ManagerConfig::from_settings(ScopeDescriptor::namespaced("ops-ns"), &settings);
        assert_eq!(config.scope.namespace(), Some("ops-ns"));
        assert_eq!(config.metrics_bind_address, "127.0.0.1:8383");

        let manager = Manager::new(config).unwrap();
        assert!(manager.scheme().is_empty());
    }

    #[test]
    fn test_scheme_lists_registered_types() {
        let mut manager = manager();
        manager.register_scheme(&Apis).unwrap();
        let kinds: Vec<_> = manager
            .scheme()
            .types()
            .map(|t| format!("{}/{}", t.api_version, t.kind))
            .collect();
        assert_eq!(kinds, vec!["vault.banzaicloud.com/v1alpha1/Vault"]);
    }

    #[tokio::test]
    async fn test_run_serves_metrics_until_signal() {
        let mut manager = manager();
        manager.register_scheme(&Apis).unwrap();
        manager.register_controllers(&NothingToRegister).unwrap();

        manager.run(async {}).await.unwrap();
        assert_eq!(manager.phase(), ManagerPhase::Stopped);
    }
}

mod resource_tests {
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use vault_operator::resources::{
        MetricsServiceDescriptor, OPERATOR_PORT_NAME, generate_metrics_service,
    };

    #[test]
    fn test_metrics_service_shape() {
        let svc = generate_metrics_service(
            "vault-operator",
            "vault-system",
            &[MetricsServiceDescriptor::for_port(8383)],
        );
        assert_eq!(svc.metadata.name.as_deref(), Some("vault-operator-metrics"));
        assert_eq!(svc.metadata.namespace.as_deref(), Some("vault-system"));

        let spec = svc.spec.unwrap();
        let selector = spec.selector.unwrap();
        assert_eq!(selector.get("name").map(String::as_str), Some("vault-operator"));

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some(OPERATOR_PORT_NAME));
        assert_eq!(ports[0].port, 8383);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8383)));
    }
}

mod crd_tests {
    use kube::{CustomResourceExt, Resource};
    use vault_operator::crd::{Vault, VaultSpec};

    #[test]
    fn test_vault_identity() {
        assert_eq!(Vault::group(&()), "vault.banzaicloud.com");
        assert_eq!(Vault::version(&()), "v1alpha1");
        assert_eq!(Vault::plural(&()), "vaults");
        assert_eq!(Vault::crd_name(), "vaults.vault.banzaicloud.com");
    }

    #[test]
    fn test_spec_defaults() {
        let spec: VaultSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.size, 1);
        assert_eq!(spec.image, "vault:1.1.2");
    }
}

mod bootstrap_tests {
    use std::process::ExitCode;

    use vault_operator::bootstrap::{BootstrapError, exit_code};
    use vault_operator::leader::LeadershipLost;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(())), ExitCode::SUCCESS);

        let err = BootstrapError::LeadershipLost(LeadershipLost::Superseded);
        assert_eq!(err.exit_code(), 1);
        assert_eq!(exit_code(&Err(err)), ExitCode::from(1));
    }

    #[test]
    fn test_only_logging_failures_skip_tracing() {
        assert!(!BootstrapError::Telemetry("subscriber already set".to_string()).is_logged());
        assert!(BootstrapError::LeadershipLost(LeadershipLost::Superseded).is_logged());
        assert!(
            BootstrapError::LeadershipLost(LeadershipLost::RenewalFailed("timeout".to_string()))
                .is_logged()
        );
    }
}
