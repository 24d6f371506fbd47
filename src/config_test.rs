#[cfg(test)]
mod tests {
    use crate::config::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["lab-apiserver", "--auth-file", "/etc/lab/auth.yaml"]).unwrap();

        assert_eq!(config.listen.to_string(), "0.0.0.0:8080");
        assert_eq!(config.namespace, "hobbyfarm");
        assert_eq!(config.auth_file.to_str(), Some("/etc/lab/auth.yaml"));

        let backoff = config.backoff();
        assert_eq!(backoff.steps, 5);
        assert_eq!(backoff.duration, Duration::from_millis(10));
        assert_eq!(backoff.max_elapsed, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "lab-apiserver",
            "--auth-file",
            "auth.yaml",
            "--listen",
            "127.0.0.1:9000",
            "--namespace",
            "labs",
            "--retry-steps",
            "8",
            "--retry-delay-ms",
            "25",
        ])
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.namespace, "labs");
        assert_eq!(config.backoff().steps, 8);
        assert_eq!(config.backoff().duration, Duration::from_millis(25));
    }

    #[test]
    fn test_rejects_bad_listen_address() {
        let result = Config::try_parse_from([
            "lab-apiserver",
            "--auth-file",
            "auth.yaml",
            "--listen",
            "not-an-address",
        ]);
        assert!(result.is_err());
    }
}
