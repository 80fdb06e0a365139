//! Commented starter configuration written by `sensorpushd init-config`

/// TOML template; every optional key shows its default
pub const CONFIG_TEMPLATE: &str = r#"# sensorpushd configuration

[api]
# Cloud account credentials. SENSORPUSHD_LOGIN / SENSORPUSHD_PASSWORD override these.
login = "you@example.com"
password = "changeme"
# base_url = "https://api.sensorpush.com/api/v1"
# token_ttl = "60m"
# token_safety_margin = "5m"
# timeout = "30s"
# verify_tls = true

[source]
# measurement_name = "SensorPush"   # voltage records go to "<name>_V"
# altitude_m = 0.0                   # site altitude when a sensor reports none
# convert_units = true               # imperial -> metric
# slice = "12h"                      # width of one upstream request
# request_delay = "60s"              # pause between requests
# sample_limit = 10000
# sensors = []                       # restrict to these sensor ids
# voltage_records = true

[daemon]
# interval = "5m"
# poll_backlog = "10m"               # first daemon cycle when no watermark exists
# oneshot_backlog = "1d"             # one-shot range without --start/--stop
# max_lookback = "30d"               # catch-up limit after downtime
# state_path = "sensorpushd-state.json"
# shutdown_grace = "30s"

[retry]
# base_delay = "10s"
# max_delay = "5m"
# multiplier = 2.0
# jitter = 0.2
# oneshot_attempts = 3
# sink_attempts = 2
# sink_retry_delay = "5s"

[[backends]]
name = "influx"
kind = "influxdb2"                   # influxdb2 | influxdb3 | victoriametrics
url = "http://localhost:8086"
token = "changeme"
org = "home"
bucket = "sensorpush"
# verify_tls = true
# required = true
# timeout = "15s"

# [[backends]]
# name = "influx3"
# kind = "influxdb3"
# url = "http://localhost:8181"
# database = "sensorpush"
# token = "changeme"

# [[backends]]
# name = "vm"
# kind = "victoriametrics"
# url = "http://localhost:8428"
"#;
