use log::{error, info, warn};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::Config;
use crate::devices::{Device, PlcTeleopDevice, TwistReading};
use crate::modbus::{ModbusClientTrait, ModbusTcpClient};
use crate::output::{formatter_for, ConsoleSender, DataFormatter, DataSender, FileSender};
use crate::utils::error::ModbusError;

#[derive(Debug)]
pub enum CycleOutcome {
    Published(TwistReading),
    Skipped(ModbusError),
}

#[derive(Debug, Default, Clone)]
pub struct CycleStats {
    pub successful: u64,
    pub failed: u64,
    pub failures_by_kind: BTreeMap<&'static str, u64>,
}

impl CycleStats {
    fn record_success(&mut self) {
        self.successful += 1;
    }

    fn record_failure(&mut self, err: &ModbusError) {
        self.failed += 1;
        *self.failures_by_kind.entry(err.kind()).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.successful + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total() as f64 * 100.0
    }
}

/// Polls the PLC once per interval and publishes each decoded twist.
pub struct BridgeService {
    config: Config,
    device: PlcTeleopDevice,
    client: Arc<dyn ModbusClientTrait>,
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
    next_transaction_id: u16,
    header_sent: bool,
    stats: CycleStats,
}

impl BridgeService {
    pub fn new(config: Config) -> Result<Self, ModbusError> {
        let client = ModbusTcpClient::new(config.endpoint(), config.timeout_ms);
        let mut service = Self::with_client(config, Arc::new(client))?;

        service.add_sender(Box::new(ConsoleSender));
        if let Some(file) = service.config.output.file_output.clone() {
            if file.enabled {
                service.add_sender(Box::new(FileSender::new(&file.path, file.append)));
            }
        }

        Ok(service)
    }

    /// Builds a service around any transport, with no senders attached.
    pub fn with_client(
        config: Config,
        client: Arc<dyn ModbusClientTrait>,
    ) -> Result<Self, ModbusError> {
        config.validate()?;

        info!("🚀 Initializing bridge service");
        info!(
            "📡 PLC {} unit {} | registers {}..{} | topic {}",
            client.endpoint(),
            config.unit_id,
            config.start_address,
            config.start_address as u32 + config.register_count as u32,
            config.topic
        );

        let device = PlcTeleopDevice::new(config.unit_id, "PLC teleop".to_string())
            .with_register_block(config.start_address, config.register_count);
        info!(
            "📋 Registered device '{}' [{}] at unit {}",
            device.name(),
            device.device_type(),
            device.unit_id()
        );
        let formatter = formatter_for(&config.output.default_format);

        Ok(Self {
            config,
            device,
            client,
            formatter,
            senders: Vec::new(),
            next_transaction_id: 1,
            header_sent: false,
            stats: CycleStats::default(),
        })
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    fn take_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Runs the pipeline once without publishing.
    pub async fn read_once(&mut self) -> Result<TwistReading, ModbusError> {
        let transaction_id = self.take_transaction_id();
        self.device.read_twist(self.client.as_ref(), transaction_id).await
    }

    /// Sends a reading to every sender. A failing sender does not fail the others.
    pub async fn publish(&mut self, reading: &TwistReading) {
        if !self.header_sent {
            let header = self.formatter.format_header();
            if !header.is_empty() {
                self.broadcast(&header).await;
            }
            self.header_sent = true;
        }

        let output = self.formatter.format_reading(&self.config.topic, reading);
        self.broadcast(&output).await;
    }

    async fn broadcast(&self, data: &str) {
        for sender in &self.senders {
            if let Err(e) = sender.send(data).await {
                error!(
                    "❌ Failed to send data via {} to {}: {}",
                    sender.sender_type(),
                    sender.destination(),
                    e
                );
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.read_once().await {
            Ok(reading) => {
                info!("✅ Publishing {}: {}", self.config.topic, reading);
                self.publish(&reading).await;
                self.stats.record_success();
                CycleOutcome::Published(reading)
            }
            Err(e) => {
                self.stats.record_failure(&e);
                match &e {
                    ModbusError::NoResponse => {
                        warn!(
                            "📵 No response from PLC {}, skipping cycle",
                            self.client.endpoint()
                        );
                    }
                    ModbusError::ProtocolException { .. } => {
                        error!("⚠️  PLC rejected the read: {}", e);
                    }
                    err if err.is_transport() => {
                        error!(
                            "🔌 Transport failure talking to {}: {}",
                            self.client.endpoint(),
                            e
                        );
                    }
                    _ => {
                        error!("💥 Bad data from PLC: {}", e);
                    }
                }
                CycleOutcome::Skipped(e)
            }
        }
    }

    /// Runs cycles until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), ModbusError> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("❌ Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(shutdown).await;
        Ok(())
    }

    /// Runs one cycle per tick until `shutdown` completes. A slow cycle makes
    /// the loop skip ticks instead of queueing them, so at most one exchange
    /// is ever in flight. Shutdown also abandons a cycle still waiting on the
    /// PLC; that cycle is not counted in the statistics.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_millis(self.config.update_interval_ms);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("🔄 Publishing to {} every {:?}", self.config.topic, period);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping bridge");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = &mut shutdown => {
                            info!("🛑 Stopping bridge, abandoning in-flight cycle");
                            break;
                        }
                    }
                }
            }
        }

        info!("📊 Final statistics:");
        info!("   ✅ Published: {}", self.stats.successful);
        info!("   ❌ Skipped: {}", self.stats.failed);
        for (kind, count) in &self.stats.failures_by_kind {
            info!("      {}: {}", kind, count);
        }
        info!("   📈 Success rate: {:.1}%", self.stats.success_rate());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ChannelSender;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Plays back one scripted reply per exchange, echoing the transaction id.
    struct ScriptedPlc {
        replies: Mutex<Vec<Result<Vec<i16>, u8>>>,
        seen_tids: Mutex<Vec<u16>>,
    }

    impl ScriptedPlc {
        fn new(replies: Vec<Result<Vec<i16>, u8>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen_tids: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModbusClientTrait for ScriptedPlc {
        async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ModbusError> {
            self.seen_tids
                .lock()
                .unwrap()
                .push(u16::from_be_bytes([request[0], request[1]]));

            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ModbusError::NoResponse);
            }
            match replies.remove(0) {
                Ok(values) => {
                    let byte_count = (values.len() * 2) as u8;
                    let mut frame = vec![
                        request[0],
                        request[1],
                        0,
                        0,
                        0,
                        3 + byte_count,
                        request[6],
                        0x03,
                        byte_count,
                    ];
                    for v in values {
                        frame.extend_from_slice(&v.to_be_bytes());
                    }
                    Ok(frame)
                }
                Err(code) => Ok(vec![request[0], request[1], 0, 0, 0, 3, request[6], 0x83, code]),
            }
        }

        fn endpoint(&self) -> &str {
            "scripted-plc"
        }
    }

    fn reference_registers() -> Vec<i16> {
        vec![0, -500, 2, 500, 1, 250, 0, 0, -1, -250, 3, 0]
    }

    #[tokio::test]
    async fn test_cycle_publishes_to_senders() {
        let plc = Arc::new(ScriptedPlc::new(vec![Ok(reference_registers())]));
        let mut config = Config::default();
        config.output.default_format = "json".to_string();
        let mut service = BridgeService::with_client(config, plc).unwrap();
        let (sender, mut rx) = ChannelSender::new("/cmd_vel".to_string(), 8);
        service.add_sender(Box::new(sender));

        let outcome = service.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Published(_)));

        let message: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(message["linear"]["x"], -0.5);
        assert_eq!(message["angular"]["y"], -1.25);
        assert_eq!(service.stats().successful, 1);
    }

    #[tokio::test]
    async fn test_failures_are_counted_per_kind() {
        let plc = Arc::new(ScriptedPlc::new(vec![
            Err(2),
            Ok(vec![1; 6]),
            Ok(reference_registers()),
        ]));
        let mut service = BridgeService::with_client(Config::default(), plc.clone()).unwrap();

        match service.run_cycle().await {
            CycleOutcome::Skipped(ModbusError::ProtocolException { code }) => assert_eq!(code, 2),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(
            service.run_cycle().await,
            CycleOutcome::Skipped(ModbusError::MalformedResponse(_))
        ));
        assert!(matches!(service.run_cycle().await, CycleOutcome::Published(_)));
        assert!(matches!(
            service.run_cycle().await,
            CycleOutcome::Skipped(ModbusError::NoResponse)
        ));

        let stats = service.stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.failures_by_kind["protocol_exception"], 1);
        assert_eq!(stats.failures_by_kind["malformed_response"], 1);
        assert_eq!(stats.failures_by_kind["no_response"], 1);
        assert_eq!(stats.success_rate(), 25.0);

        assert_eq!(*plc.seen_tids.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_csv_header_sent_once() {
        let plc = Arc::new(ScriptedPlc::new(vec![
            Ok(reference_registers()),
            Ok(reference_registers()),
        ]));
        let mut config = Config::default();
        config.output.default_format = "csv".to_string();
        let mut service = BridgeService::with_client(config, plc).unwrap();
        let (sender, mut rx) = ChannelSender::new("/cmd_vel".to_string(), 8);
        service.add_sender(Box::new(sender));

        service.run_cycle().await;
        service.run_cycle().await;

        assert!(rx.recv().await.unwrap().starts_with("Timestamp,"));
        assert!(rx.recv().await.unwrap().contains("/cmd_vel,1,"));
        assert!(rx.recv().await.unwrap().contains("/cmd_vel,2,"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let replies = (0..50).map(|_| Ok(reference_registers())).collect();
        let plc = Arc::new(ScriptedPlc::new(replies));
        let mut config = Config::default();
        config.update_interval_ms = 20;
        let mut service = BridgeService::with_client(config, plc).unwrap();

        service
            .run_until(tokio::time::sleep(Duration::from_millis(110)))
            .await;

        assert!(service.stats().successful >= 1);
        assert_eq!(service.stats().failed, 0);
    }

    /// Never answers within any reasonable test window.
    struct StalledPlc;

    #[async_trait]
    impl ModbusClientTrait for StalledPlc {
        async fn exchange(&self, _request: &[u8]) -> Result<Vec<u8>, ModbusError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ModbusError::Timeout)
        }

        fn endpoint(&self) -> &str {
            "stalled-plc"
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_in_flight_cycle() {
        let mut service =
            BridgeService::with_client(Config::default(), Arc::new(StalledPlc)).unwrap();

        let stopped = tokio::time::timeout(
            Duration::from_secs(2),
            service.run_until(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;

        assert!(stopped.is_ok(), "shutdown waited for the stalled exchange");
        assert_eq!(service.stats().total(), 0);
    }

    #[test]
    fn test_new_targets_configured_endpoint() {
        let mut config = Config::default();
        config.plc_host = "10.4.0.9".to_string();
        config.plc_port = 1502;
        let service = BridgeService::new(config).unwrap();
        assert_eq!(service.client.endpoint(), "10.4.0.9:1502");
        assert_eq!(service.senders.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let plc = Arc::new(ScriptedPlc::new(Vec::new()));
        let mut config = Config::default();
        config.register_count = 0;
        assert!(matches!(
            BridgeService::with_client(config, plc),
            Err(ModbusError::ConfigError(_))
        ));
    }
}
