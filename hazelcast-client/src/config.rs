//! Client configuration types and builders.

use std::time::Duration;

use bytes::Bytes;
use hazelcast_core::HazelcastError;

use crate::connection::Address;

/// Default cluster name.
const DEFAULT_CLUSTER_NAME: &str = "dev";
/// Default address when none is configured; expands to the default port range.
const DEFAULT_ADDRESS: &str = "127.0.0.1";
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default heartbeat interval.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Default heartbeat timeout.
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default initial retry backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Default maximum retry backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default retry multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
/// Default retry jitter.
const DEFAULT_RETRY_JITTER: f64 = 0.0;
/// Default member count for multi-member routing.
const DEFAULT_MULTI_MEMBER_COUNT: usize = 3;
/// Default invocation timeout.
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default pause between invocation retries.
const DEFAULT_INVOCATION_RETRY_PAUSE: Duration = Duration::from_secs(1);
/// Default number of passes over the failover candidate list.
const DEFAULT_FAILOVER_TRY_COUNT: u32 = 3;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for HazelcastError {
    fn from(err: ConfigError) -> Self {
        HazelcastError::Configuration(err.message)
    }
}

/// How the client spreads its connections over the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoutingMode {
    /// One connection to one member.
    SingleMember,
    /// One connection to every member.
    #[default]
    AllMembers,
    /// Connections to a configured subset of members.
    MultiMember,
}

impl RoutingMode {
    /// Byte sent in the authentication request.
    pub fn as_byte(self) -> u8 {
        match self {
            RoutingMode::SingleMember => 0,
            RoutingMode::AllMembers => 1,
            RoutingMode::MultiMember => 2,
        }
    }
}

/// How multi-member routing picks its target members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MultiMemberStrategy {
    /// The first members of the member list.
    #[default]
    MemberListOrder,
    /// Members carrying `key = value` first, then the rest in list order.
    PreferAttribute {
        /// Attribute name.
        key: String,
        /// Expected value.
        value: String,
    },
}

/// Network configuration for cluster connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    addresses: Vec<Address>,
    shuffle_addresses: bool,
    routing_mode: RoutingMode,
    multi_member_count: usize,
    multi_member_strategy: MultiMemberStrategy,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    redo_operation: bool,
}

impl NetworkConfig {
    /// Returns the candidate addresses, with bare hosts already expanded.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Returns true if candidate addresses are tried in random order.
    pub fn shuffle_addresses(&self) -> bool {
        self.shuffle_addresses
    }

    /// Returns the routing mode.
    pub fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    /// Returns how many members multi-member routing connects to.
    pub fn multi_member_count(&self) -> usize {
        self.multi_member_count
    }

    /// Returns the multi-member target selection strategy.
    pub fn multi_member_strategy(&self) -> &MultiMemberStrategy {
        &self.multi_member_strategy
    }

    /// Returns the connection timeout duration.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the heartbeat interval duration.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns how long a connection may stay silent before it is closed.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Returns true if non-retryable operations lost in flight are sent again.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            addresses: default_addresses(),
            shuffle_addresses: true,
            routing_mode: RoutingMode::default(),
            multi_member_count: DEFAULT_MULTI_MEMBER_COUNT,
            multi_member_strategy: MultiMemberStrategy::default(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            redo_operation: false,
        }
    }
}

fn default_addresses() -> Vec<Address> {
    crate::connection::DEFAULT_PORTS
        .iter()
        .map(|port| Address::new(DEFAULT_ADDRESS, *port))
        .collect()
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    addresses: Vec<String>,
    shuffle_addresses: Option<bool>,
    routing_mode: Option<RoutingMode>,
    multi_member_count: Option<usize>,
    multi_member_strategy: Option<MultiMemberStrategy>,
    connection_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Option<Duration>,
    redo_operation: Option<bool>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster member address, `host:port` or a bare host.
    pub fn add_address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Sets the cluster member addresses, replacing any previously configured.
    pub fn addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether candidate addresses are shuffled before each pass.
    pub fn shuffle_addresses(mut self, shuffle: bool) -> Self {
        self.shuffle_addresses = Some(shuffle);
        self
    }

    /// Sets the routing mode.
    pub fn routing_mode(mut self, mode: RoutingMode) -> Self {
        self.routing_mode = Some(mode);
        self
    }

    /// Selects multi-member routing with the given member count and strategy.
    pub fn multi_member(mut self, count: usize, strategy: MultiMemberStrategy) -> Self {
        self.routing_mode = Some(RoutingMode::MultiMember);
        self.multi_member_count = Some(count);
        self.multi_member_strategy = Some(strategy);
        self
    }

    /// Sets the connection timeout duration.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the heartbeat interval duration.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the heartbeat timeout duration.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Sets whether operations lost in flight are always sent again.
    pub fn redo_operation(mut self, redo: bool) -> Self {
        self.redo_operation = Some(redo);
        self
    }

    /// Builds the network configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an address cannot be parsed, a timeout is
    /// zero, or multi-member routing targets no members.
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let addresses = if self.addresses.is_empty() {
            default_addresses()
        } else {
            let mut parsed = Vec::new();
            for address in &self.addresses {
                let candidates = Address::parse_candidates(address).map_err(|e| {
                    ConfigError::new(format!("invalid address '{}': {}", address, e))
                })?;
                for candidate in candidates {
                    if !parsed.contains(&candidate) {
                        parsed.push(candidate);
                    }
                }
            }
            parsed
        };

        let multi_member_count = self
            .multi_member_count
            .unwrap_or(DEFAULT_MULTI_MEMBER_COUNT);
        if multi_member_count == 0 {
            return Err(ConfigError::new(
                "multi-member routing needs at least one member",
            ));
        }

        let connection_timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        let heartbeat_timeout = self.heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        if connection_timeout.is_zero() || heartbeat_interval.is_zero() || heartbeat_timeout.is_zero()
        {
            return Err(ConfigError::new(
                "connection and heartbeat timeouts must be positive",
            ));
        }

        Ok(NetworkConfig {
            addresses,
            shuffle_addresses: self.shuffle_addresses.unwrap_or(true),
            routing_mode: self.routing_mode.unwrap_or_default(),
            multi_member_count,
            multi_member_strategy: self.multi_member_strategy.unwrap_or_default(),
            connection_timeout,
            heartbeat_interval,
            heartbeat_timeout,
            redo_operation: self.redo_operation.unwrap_or(false),
        })
    }
}

/// Backoff between cluster connection attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Option<Duration>,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter fraction in `[0, 1]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns how long one cluster is tried before giving up; `None` is unlimited.
    pub fn cluster_connect_timeout(&self) -> Option<Duration> {
        self.cluster_connect_timeout
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
            cluster_connect_timeout: None,
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    cluster_connect_timeout: Option<Option<Duration>>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter fraction.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Bounds the time spent trying to reach one cluster.
    pub fn cluster_connect_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_connect_timeout = Some(Some(timeout));
        self
    }

    /// Keeps trying one cluster forever.
    pub fn unlimited_cluster_connect_timeout(mut self) -> Self {
        self.cluster_connect_timeout = Some(None);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside `[0, 1]`
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let jitter = self.jitter.unwrap_or(DEFAULT_RETRY_JITTER);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be between 0.0 and 1.0"));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            cluster_connect_timeout: self.cluster_connect_timeout.unwrap_or(None),
        })
    }
}

/// What the client does after losing its last connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectMode {
    /// Reconnect; invocations wait for the connection.
    #[default]
    On,
    /// Shut the client down.
    Off,
    /// Reconnect in the background; invocations fail fast with `ClientOffline`.
    Async,
}

/// Connection strategy: startup behavior, reconnection and backoff.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStrategyConfig {
    async_start: bool,
    reconnect_mode: ReconnectMode,
    retry: RetryConfig,
}

impl ConnectionStrategyConfig {
    /// Returns true if startup returns before the first connection exists.
    pub fn async_start(&self) -> bool {
        self.async_start
    }

    /// Returns the reconnect mode.
    pub fn reconnect_mode(&self) -> ReconnectMode {
        self.reconnect_mode
    }

    /// Returns the retry configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Builder for `ConnectionStrategyConfig`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStrategyConfigBuilder {
    async_start: Option<bool>,
    reconnect_mode: Option<ReconnectMode>,
    retry: RetryConfigBuilder,
}

impl ConnectionStrategyConfigBuilder {
    /// Creates a new connection strategy builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether startup blocks until the client is connected.
    pub fn async_start(mut self, async_start: bool) -> Self {
        self.async_start = Some(async_start);
        self
    }

    /// Sets the reconnect mode.
    pub fn reconnect_mode(mut self, mode: ReconnectMode) -> Self {
        self.reconnect_mode = Some(mode);
        self
    }

    /// Configures retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Builds the connection strategy.
    pub fn build(self) -> Result<ConnectionStrategyConfig, ConfigError> {
        Ok(ConnectionStrategyConfig {
            async_start: self.async_start.unwrap_or(false),
            reconnect_mode: self.reconnect_mode.unwrap_or_default(),
            retry: self.retry.build()?,
        })
    }
}

/// Credentials presented during authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password.
    UsernamePassword {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Opaque token.
    Token(Bytes),
    /// Application-defined serialized credentials.
    Custom(Bytes),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token(_) => f.write_str("Token(<redacted>)"),
            Credentials::Custom(bytes) => write!(f, "Custom({} bytes)", bytes.len()),
        }
    }
}

/// Security configuration for authentication.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    credentials: Option<Credentials>,
}

impl SecurityConfig {
    /// Returns the configured credentials.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the configured username, if username/password is used.
    pub fn username(&self) -> Option<&str> {
        match &self.credentials {
            Some(Credentials::UsernamePassword { username, .. }) => Some(username),
            _ => None,
        }
    }

    /// Returns true if any credentials are configured.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Builder for `SecurityConfig`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    token: Option<Bytes>,
    custom: Option<Bytes>,
}

impl SecurityConfigBuilder {
    /// Creates a new security configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password for authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets both username and password for authentication.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(username).password(password)
    }

    /// Sets an opaque authentication token.
    pub fn token(mut self, token: impl Into<Bytes>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets application-defined serialized credentials.
    pub fn custom_credentials(mut self, credentials: impl Into<Bytes>) -> Self {
        self.custom = Some(credentials.into());
        self
    }

    /// Builds the security configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Only one of `username` or `password` is set (both must be provided together)
    /// - More than one kind of credentials is set (they are mutually exclusive)
    pub fn build(self) -> Result<SecurityConfig, ConfigError> {
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::new(
                "both username and password must be provided together",
            ));
        }

        let kinds = usize::from(self.username.is_some())
            + usize::from(self.token.is_some())
            + usize::from(self.custom.is_some());
        if kinds > 1 {
            return Err(ConfigError::new(
                "username/password, token and custom credentials are mutually exclusive",
            ));
        }

        let credentials = match (self.username, self.password, self.token, self.custom) {
            (Some(username), Some(password), _, _) => {
                Some(Credentials::UsernamePassword { username, password })
            }
            (_, _, Some(token), _) => Some(Credentials::Token(token)),
            (_, _, _, Some(custom)) => Some(Credentials::Custom(custom)),
            _ => None,
        };

        Ok(SecurityConfig { credentials })
    }
}

/// Main client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    cluster_name: String,
    instance_name: Option<String>,
    labels: Vec<String>,
    network: NetworkConfig,
    connection_strategy: ConnectionStrategyConfig,
    security: SecurityConfig,
    invocation_timeout: Duration,
    invocation_retry_pause: Duration,
    skip_cluster_name_check: bool,
    cp_direct_to_leader_routing: bool,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the instance name, if set.
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    /// Returns the client labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the connection strategy.
    pub fn connection_strategy(&self) -> &ConnectionStrategyConfig {
        &self.connection_strategy
    }

    /// Returns the retry configuration of the connection strategy.
    pub fn retry(&self) -> &RetryConfig {
        self.connection_strategy.retry()
    }

    /// Returns the security configuration.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Returns the invocation timeout.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Returns the pause between invocation retries.
    pub fn invocation_retry_pause(&self) -> Duration {
        self.invocation_retry_pause
    }

    /// Returns true if the member's reported cluster name is not checked.
    pub fn skip_cluster_name_check(&self) -> bool {
        self.skip_cluster_name_check
    }

    /// Returns the direct-to-leader routing preference sent on authentication.
    pub fn cp_direct_to_leader_routing(&self) -> bool {
        self.cp_direct_to_leader_routing
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            instance_name: None,
            labels: Vec::new(),
            network: NetworkConfig::default(),
            connection_strategy: ConnectionStrategyConfig::default(),
            security: SecurityConfig::default(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            invocation_retry_pause: DEFAULT_INVOCATION_RETRY_PAUSE,
            skip_cluster_name_check: false,
            cp_direct_to_leader_routing: false,
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    instance_name: Option<String>,
    labels: Vec<String>,
    network: NetworkConfigBuilder,
    connection_strategy: ConnectionStrategyConfigBuilder,
    security: SecurityConfigBuilder,
    invocation_timeout: Option<Duration>,
    invocation_retry_pause: Option<Duration>,
    skip_cluster_name_check: bool,
    cp_direct_to_leader_routing: bool,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Sets the instance name.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Adds a label sent to members on authentication.
    pub fn add_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures the connection strategy using a builder function.
    pub fn connection_strategy<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ConnectionStrategyConfigBuilder) -> ConnectionStrategyConfigBuilder,
    {
        self.connection_strategy = f(self.connection_strategy);
        self
    }

    /// Configures retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.connection_strategy = self.connection_strategy.retry(f);
        self
    }

    /// Configures security settings using a builder function.
    pub fn security<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SecurityConfigBuilder) -> SecurityConfigBuilder,
    {
        self.security = f(self.security);
        self
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: impl Into<String>) -> Self {
        self.network = self.network.add_address(address);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Sets credentials for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.security = self.security.credentials(username, password);
        self
    }

    /// Sets the invocation timeout.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Sets the pause between invocation retries.
    pub fn invocation_retry_pause(mut self, pause: Duration) -> Self {
        self.invocation_retry_pause = Some(pause);
        self
    }

    /// Accepts members whatever cluster name they report.
    pub fn skip_cluster_name_check(mut self, skip: bool) -> Self {
        self.skip_cluster_name_check = skip;
        self
    }

    /// Sets the direct-to-leader routing preference.
    pub fn cp_direct_to_leader_routing(mut self, enabled: bool) -> Self {
        self.cp_direct_to_leader_routing = enabled;
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let cluster_name = self
            .cluster_name
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        if cluster_name.is_empty() {
            return Err(ConfigError::new("cluster_name must not be empty"));
        }

        let invocation_timeout = self.invocation_timeout.unwrap_or(DEFAULT_INVOCATION_TIMEOUT);
        if invocation_timeout.is_zero() {
            return Err(ConfigError::new("invocation_timeout must be positive"));
        }

        Ok(ClientConfig {
            cluster_name,
            instance_name: self.instance_name,
            labels: self.labels,
            network: self.network.build()?,
            connection_strategy: self.connection_strategy.build()?,
            security: self.security.build()?,
            invocation_timeout,
            invocation_retry_pause: self
                .invocation_retry_pause
                .unwrap_or(DEFAULT_INVOCATION_RETRY_PAUSE),
            skip_cluster_name_check: self.skip_cluster_name_check,
            cp_direct_to_leader_routing: self.cp_direct_to_leader_routing,
        })
    }
}

/// Ordered candidate clusters for blue/green failover.
#[derive(Debug, Clone)]
pub struct ClientFailoverConfig {
    configs: Vec<ClientConfig>,
    try_count: u32,
}

impl ClientFailoverConfig {
    /// Creates a new failover configuration builder.
    pub fn builder() -> ClientFailoverConfigBuilder {
        ClientFailoverConfigBuilder::default()
    }

    /// Returns the candidate configurations in preference order.
    pub fn configs(&self) -> &[ClientConfig] {
        &self.configs
    }

    /// Returns how many times each candidate is tried.
    pub fn try_count(&self) -> u32 {
        self.try_count
    }
}

/// Builder for `ClientFailoverConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientFailoverConfigBuilder {
    configs: Vec<ClientConfig>,
    try_count: Option<u32>,
}

impl ClientFailoverConfigBuilder {
    /// Appends a candidate cluster.
    pub fn add_client_config(mut self, config: ClientConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Sets how many times each candidate is tried.
    pub fn try_count(mut self, try_count: u32) -> Self {
        self.try_count = Some(try_count);
        self
    }

    /// Builds the failover configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if no candidate is configured, `try_count` is
    /// zero, or the candidates disagree on the routing mode.
    pub fn build(self) -> Result<ClientFailoverConfig, ConfigError> {
        let Some(first) = self.configs.first() else {
            return Err(ConfigError::new(
                "failover requires at least one client configuration",
            ));
        };

        let try_count = self.try_count.unwrap_or(DEFAULT_FAILOVER_TRY_COUNT);
        if try_count == 0 {
            return Err(ConfigError::new("try_count must be at least 1"));
        }

        let mode = first.network().routing_mode();
        if self
            .configs
            .iter()
            .any(|config| config.network().routing_mode() != mode)
        {
            return Err(ConfigError::new(
                "all failover configurations must use the same routing mode",
            ));
        }

        Ok(ClientFailoverConfig {
            configs: self.configs,
            try_count,
        })
    }
}
