//! Unit tests for reconcile helpers

#[cfg(test)]
mod tests {
    use crate::reconcile_helpers::*;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::EnvVar;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use serde_json::json;

    #[test]
    fn test_derivative_ignores_server_defaults() {
        let desired = json!({
            "containers": [{"name": "lab", "image": "jupyter"}],
            "securityContext": {"fsGroup": 100}
        });
        let existing = json!({
            "containers": [{
                "name": "lab",
                "image": "jupyter",
                "imagePullPolicy": "IfNotPresent",
                "terminationMessagePath": "/dev/termination-log"
            }],
            "securityContext": {"fsGroup": 100},
            "dnsPolicy": "ClusterFirst",
            "restartPolicy": "Always"
        });
        assert!(is_derivative(&desired, &existing));
    }

    #[test]
    fn test_derivative_detects_changed_values() {
        let existing = json!({"containers": [{"name": "lab", "image": "jupyter:1"}]});

        let new_image = json!({"containers": [{"name": "lab", "image": "jupyter:2"}]});
        assert!(!is_derivative(&new_image, &existing));

        let extra_container = json!({"containers": [{"name": "lab"}, {"name": "sidecar"}]});
        assert!(!is_derivative(&extra_container, &existing));

        let new_field = json!({"containers": [{"name": "lab", "workingDir": "/home/jovyan"}]});
        assert!(!is_derivative(&new_field, &existing));
    }

    #[test]
    fn test_derivative_null_means_unset() {
        assert!(is_derivative(&json!({"replicas": null}), &json!({"replicas": 0})));
        assert!(is_derivative(&json!(null), &json!({"anything": true})));
    }

    #[test]
    fn test_to_utc() {
        let time: Time = serde_json::from_value(json!("2024-05-01T10:00:00Z")).unwrap();
        assert_eq!(
            to_utc(&time),
            Some(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_upsert_env_replaces_by_name() {
        let mut env = vec![EnvVar {
            name: "A".to_string(),
            value: Some("1".to_string()),
            value_from: None,
        }];

        upsert_env(&mut env, "NB_PREFIX", "/notebook/alice/lab".to_string());
        upsert_env(&mut env, "NB_PREFIX", "/notebook/alice/lab".to_string());
        assert_eq!(env.len(), 2);

        upsert_env(&mut env, "A", "2".to_string());
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].value.as_deref(), Some("2"));
        assert_eq!(env[1].value.as_deref(), Some("/notebook/alice/lab"));
    }
}
