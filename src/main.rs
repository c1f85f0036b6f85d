#![no_std]
#![no_main]

use alloc::string::String;

use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_net::{Config, Stack, StackResources};
use embassy_time::{Delay, Duration, Instant, Ticker};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::rng::Rng;
use esp_hal::spi::Mode;
use esp_hal::spi::master::Spi;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_embassy::Executor;
use esp_println::println;
use esp_wifi::wifi;
use static_cell::StaticCell;

extern crate alloc;

use tagplay_board::audio::Microphone;
use tagplay_board::board::EspBoard;
use tagplay_board::config;
use tagplay_board::http_transport::{
    HttpsTcpClient, HttpsTransport, TCP_BUF_SIZE, TransportBuffers,
};
use tagplay_board::led_strip::LedStrip;
use tagplay_board::rng::HwRng;
use tagplay_board::tag_reader::RfidReader;
use tagplay_board::web_server;
use tagplay_board::wifi::WiFiManager;
use tagplay_core::app::{Player, PlayerConfig};
use tagplay_core::config::TICK_INTERVAL_MS;
use tagplay_core::remote::{RemoteClient, RemoteCredentials};
use tagplay_core::retry::RetryPolicy;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type LedChannel = esp_hal::rmt::Channel<Blocking, 0>;
type RfidSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
type DeviceBoard = EspBoard<LedChannel, RfidSpi, Output<'static>>;
type DevicePlayer = Player<DeviceBoard, HttpsTransport, Delay, HwRng, { config::LED_COUNT }>;

static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static TCP_STATE: StaticCell<TcpClientState<1, TCP_BUF_SIZE, TCP_BUF_SIZE>> = StaticCell::new();
static TCP_CLIENT: StaticCell<HttpsTcpClient> = StaticCell::new();
static DNS_SOCKET: StaticCell<DnsSocket<'static>> = StaticCell::new();
static TRANSPORT_BUFFERS: StaticCell<TransportBuffers> = StaticCell::new();

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[MAIN] Panic: {}", info);
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

/// Fixed period scheduler: one player tick, then at most one web request
#[embassy_executor::task]
async fn player_task(mut player: DevicePlayer) -> ! {
    println!("[STATE] Player running, tick {} ms", TICK_INTERVAL_MS);
    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS));
    loop {
        player.tick(Instant::now().as_millis()).await;

        if let Some((sequence, request)) = web_server::poll_request() {
            let reply = player.handle_api(&request).await;
            web_server::reply(sequence, reply);
        }

        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn web_server_task(stack: Stack<'static>) -> ! {
    web_server::serve(stack).await
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);
    println!("[MAIN] tagplay-board {}", tagplay_board::VERSION);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 96 * 1024);

    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // WiFi
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let rng = Rng::new(peripherals.RNG);
    let wifi_init = match esp_wifi::init(timer_group1.timer0, rng.clone(), peripherals.RADIO_CLK) {
        Ok(init) => init,
        Err(e) => {
            println!("[WIFI] ❌ Driver init failed: {:?}", e);
            panic!("WiFi initialization failed");
        }
    };
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = match wifi::new(wifi_init_ref, peripherals.WIFI) {
        Ok(parts) => parts,
        Err(e) => {
            println!("[WIFI] ❌ Controller creation failed: {:?}", e);
            panic!("WiFi initialization failed");
        }
    };
    println!("[WIFI] WiFi controller and device created successfully");

    let mut hw_rng = HwRng::new(rng);
    let seed = rand_core::RngCore::next_u64(&mut hw_rng);
    let (stack, runner) = embassy_net::new(
        wifi_interfaces.sta,
        Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::new()),
        seed,
    );
    let wifi_manager = WiFiManager::new(wifi_controller, stack);

    // HTTPS client
    let tcp_state = TCP_STATE.init(TcpClientState::new());
    let tcp_client: &'static HttpsTcpClient = TCP_CLIENT.init(TcpClient::new(stack, tcp_state));
    let dns_socket: &'static DnsSocket<'static> = DNS_SOCKET.init(DnsSocket::new(stack));
    let buffers = TRANSPORT_BUFFERS.init(TransportBuffers::new());
    let transport = HttpsTransport::new(tcp_client, dns_socket, buffers, hw_rng.clone());

    // LED ring
    println!("[LED] Initializing RMT on GPIO{}", config::LED_DATA_PIN);
    let rmt = match Rmt::new(peripherals.RMT, Rate::from_mhz(10)) {
        Ok(rmt) => rmt,
        Err(e) => {
            println!("[LED] ❌ Failed to initialize RMT: {:?}", e);
            panic!("RMT initialization failed");
        }
    };
    let tx_config = TxChannelConfig::default()
        .with_clk_divider(1)
        .with_idle_output_level(Level::Low)
        .with_idle_output(false)
        .with_carrier_modulation(false);
    let led_channel: LedChannel = match rmt.channel0.configure(peripherals.GPIO4, tx_config) {
        Ok(channel) => channel,
        Err(e) => {
            println!("[LED] ❌ Failed to configure RMT channel: {:?}", e);
            panic!("RMT initialization failed");
        }
    };
    let strip = LedStrip::new(led_channel);

    // RFID reader
    println!("[TAG] Initializing SPI for MFRC522");
    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_khz(config::RFID_SPI_KHZ))
        .with_mode(Mode::_0);
    let spi = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO6)
            .with_mosi(peripherals.GPIO7)
            .with_miso(peripherals.GPIO5),
        Err(e) => {
            println!("[TAG] ❌ Failed to configure SPI: {:?}", e);
            panic!("SPI initialization failed");
        }
    };
    let cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO3, Level::Low, OutputConfig::default());
    let Ok(spi_device) = ExclusiveDevice::new(spi, cs, Delay);
    let reader = RfidReader::new(spi_device, rst);

    // Microphone
    let mut adc_config = AdcConfig::new();
    let mic_pin = adc_config.enable_pin(peripherals.GPIO0, Attenuation::_11dB);
    let mic = Microphone::new(Adc::new(peripherals.ADC1, adc_config), mic_pin);

    // Player
    let credentials = RemoteCredentials {
        client_id: String::from(config::SPOTIFY_CLIENT_ID),
        client_secret: String::from(config::SPOTIFY_CLIENT_SECRET),
        refresh_token: String::from(config::SPOTIFY_REFRESH_TOKEN),
        target_name: String::from(config::SPOTIFY_DEVICE_NAME),
    };
    let remote = RemoteClient::new(
        transport,
        Delay,
        hw_rng.clone(),
        RetryPolicy::default(),
        credentials,
    );
    let board = EspBoard::new(reader, wifi_manager, strip, mic);
    let player: DevicePlayer = Player::new(
        board,
        remote,
        hw_rng,
        PlayerConfig::default(),
        Instant::now().as_millis(),
    );

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        println!("[MAIN] Spawning player task...");
        spawner.spawn(player_task(player)).ok();

        println!("[MAIN] Spawning web server task...");
        spawner.spawn(web_server_task(stack)).ok();
    });
}
