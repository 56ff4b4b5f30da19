// Crumble - Temperature and humidity readings from DHT22 sensors
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::{crate_version, Parser, ValueEnum};
use crumble::batch::{BatchController, ReadStatus, Sensor, SensorConfig, DEFAULT_MAX_ATTEMPTS};
use crumble::http::{http_route, RequestContext};
use crumble::metrics::{MetricsExposition, TemperatureMetrics};
use crumble::output;
use crumble::sensor::{open_port, DHT22Reader, NormalScheduler, RealtimeScheduler};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::signal::unix::{self, SignalKind};
use tokio::task;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::WARN;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9781);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// Read temperature and humidity from DHT22 sensors
///
/// Read temperature and humidity data from one or more DHT22 sensors connected to
/// data pins of a local machine, usually a Raspberry PI. Sensors are read one after
/// another and failed reads are retried after a two second delay.
///
/// Each sensor must be connected to one of the General Purpose IO pins (GPIO). The
/// numbering of these pins (and how the pin number is provided to crumble) is based
/// on the Broadcom SOC channel.
#[derive(Debug, Parser)]
#[clap(name = "crumble", version = crate_version!())]
struct CrumbleApplication {
    /// BCM GPIO pin number a DHT22 sensor data line is connected to, optionally
    /// followed by a name for the sensor (PIN or PIN:NAME). May be repeated.
    #[clap(long = "sensor", required = true)]
    sensors: Vec<SensorConfig>,

    /// Maximum number of attempts at reading each sensor
    #[clap(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    attempts: NonZeroU32,

    /// Format to print readings in
    #[clap(long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Don't switch to real-time scheduling while reading sensors
    #[clap(long)]
    no_realtime: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Read sensors in the background and expose them as Prometheus metrics instead
    /// of printing them once
    #[clap(long)]
    serve: bool,

    /// Read the sensors at this interval, in seconds, when exposing metrics
    #[clap(long, default_value = "30")]
    refresh_secs: NonZeroU64,

    /// Address to bind to when exposing metrics. By default, crumble will bind to public
    /// address since the purpose is to expose metrics to an external system (Prometheus
    /// or another agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = CrumbleApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let pins: Vec<u8> = opts.sensors.iter().map(|s| s.pin).collect();
    let port = open_port(&pins).unwrap_or_else(|e| {
        tracing::error!(message = "failed to initialize GPIO pins", bcm_pins = ?pins, error = %e);
        process::exit(1)
    });

    let reader = if opts.no_realtime {
        DHT22Reader::new(port, NormalScheduler)
    } else {
        DHT22Reader::new(port, RealtimeScheduler)
    };

    let controller = BatchController::new(reader, opts.attempts);
    let sensors: Vec<Sensor> = opts.sensors.iter().cloned().map(Sensor::new).collect();

    if opts.serve {
        serve(&opts, controller, sensors).await
    } else {
        read_once(&opts, controller, sensors).await
    }
}

/// Read every sensor once, print the results, and exit non-zero if any of them
/// couldn't be read.
async fn read_once(
    opts: &CrumbleApplication,
    mut controller: BatchController,
    mut sensors: Vec<Sensor>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sensors = task::spawn_blocking(move || {
        controller.run(&mut sensors);
        sensors
    })
    .instrument(tracing::span!(Level::DEBUG, "sensor_read"))
    .await?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match opts.format {
        OutputFormat::Human => output::write_human(&mut out, &sensors)?,
        OutputFormat::Json => output::write_json(&mut out, &sensors)?,
    }
    out.flush()?;

    if sensors.iter().any(|s| s.status() != ReadStatus::Ok) {
        process::exit(1);
    }

    Ok(())
}

/// Periodically read sensors in the background and expose the most recent readings
/// as Prometheus metrics until SIGTERM or SIGINT.
async fn serve(
    opts: &CrumbleApplication,
    controller: BatchController,
    sensors: Vec<Sensor>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let startup = Instant::now();
    let registry = prometheus::default_registry().clone();
    let metrics = TemperatureMetrics::new(&registry).unwrap_or_else(|e| {
        tracing::error!(message = "failed to register sensor metrics", error = %e);
        process::exit(1)
    });

    // Only one batch of reads can be in progress at once since each batch holds the lock.
    let state = Arc::new(Mutex::new((controller, sensors)));
    let refresh = Duration::from_secs(opts.refresh_secs.get());

    // Periodically read from the sensors and update metrics based on the readings.
    task::spawn(async move {
        let mut interval = refresh_interval(refresh);

        loop {
            let _ = interval.tick().await;
            let state_ref = state.clone();

            let res = task::spawn_blocking(move || {
                let mut guard = state_ref.lock().unwrap_or_else(PoisonError::into_inner);
                let (controller, sensors) = &mut *guard;
                controller.run(sensors);
                sensors.clone()
            })
            .instrument(tracing::span!(Level::DEBUG, "sensor_read"))
            .await;

            match res {
                Ok(sensors) => metrics.update(&sensors),
                Err(e) => tracing::error!(message = "sensor read task failed", error = %e),
            }
        }
    });

    let context = Arc::new(RequestContext::new(MetricsExposition::new(registry)));
    let service = make_service_fn(move |_| {
        let context = context.clone();

        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                http_route(req, context.clone()).instrument(tracing::span!(Level::DEBUG, "crumble_request"))
            }))
        }
    });

    let server = Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error starting server", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "starting server", address = %opts.bind, sensors = opts.sensors.len());
    server
        .serve(service)
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!(message = "server shutdown", runtime_secs = %startup.elapsed().as_secs());
    Ok(())
}

/// Ticks for periodic batches of reads. A batch that runs longer than the refresh
/// period pushes back the next one instead of being followed by an immediate catch-up
/// batch, since a DHT22 can't be read again within two seconds.
fn refresh_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
