use std::{sync::mpsc, time::Duration};

use anyhow::{anyhow, Context};
use clap::Parser;
use eframe::egui;
use env_logger::Env;
use gui::render_gui;
use log::{error, info, warn};
use mdns_interface::ServiceAdvertisement;
use mediation::{tables::Tables, Mediator, MonitorModel};
use midi_interface::{connect, list_midi_ports};
use osc_interface::{Destination, Publisher, UdpTransport};
use settings::{AppConfig, Cli};

mod gui;
mod mdns_interface;
mod mediation;
mod midi_interface;
mod osc_interface;
mod settings;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        for (i, name) in list_midi_ports()?.iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.app_options.log_level.clone());

    env_logger::Builder::from_env(Env::default().default_filter_or(&log_level))
        .filter_module("egui_glow", log::LevelFilter::Warn)
        .filter_module("egui_winit", log::LevelFilter::Warn)
        .filter_module("eframe", log::LevelFilter::Warn)
        .init();

    info!("Loading app configuration and templates...");
    let tables = match &cli.templates {
        Some(path) => Tables::load(path)?,
        None => Tables::builtin()?,
    };

    info!("Setting up OSC communication...");
    let mut publisher = Publisher::new(UdpTransport::bind()?, config.osc_options.max_workers);
    for (name, target) in config.osc_options.targets.iter() {
        publisher.register(name, &target.address, target.port);
    }
    let mediator = Mediator::new(tables, publisher);
    let destinations: Vec<Destination> = mediator.publisher().destinations().cloned().collect();
    if destinations.is_empty() {
        warn!("No OSC targets configured; decoded events will not be sent anywhere");
    }

    // Unregistered when dropped at the end of main.
    let _advertisement = match &config.osc_options.listen {
        Some(listen) => {
            info!("Registering application for service discovery...");
            match ServiceAdvertisement::register(listen) {
                Ok(advertisement) => Some(advertisement),
                Err(e) => {
                    warn!("Service discovery unavailable: {:#}", e);
                    None
                }
            }
        }
        None => None,
    };

    info!("Setting up MIDI communication...");
    let port_name = cli
        .midi_port
        .clone()
        .unwrap_or_else(|| config.midi_options.control_port_name.clone());
    let (midi_tx, midi_rx) = mpsc::sync_channel(config.midi_options.queue_size_limit.max(1));
    let midi_connection = connect(&port_name, midi_tx)?;

    if cli.headless_mode {
        let (stop_tx, stop_rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = stop_tx.send(());
        })
        .context("failed to install Ctrl+C handler")?;

        let mediator_thread = mediator.spawn(midi_rx)?;
        info!("Running in headless mode; Ctrl+C to quit");
        if stop_rx.recv().is_err() {
            warn!("Ctrl+C handler is gone; shutting down");
        }

        info!("Closing MIDI input; publishing what is still queued...");
        midi_connection.close();
        if mediator_thread.join().is_err() {
            error!("Mediator thread panicked");
        }
        Ok(())
    } else {
        let (monitor_tx, monitor_rx) = mpsc::channel();
        let mediator_thread = mediator.with_monitor(monitor_tx).spawn(midi_rx)?;

        info!("Running graphics mode; close the window to quit");
        let model = MonitorModel::new(port_name, destinations, monitor_rx);
        let options = eframe::NativeOptions::default();
        eframe::run_native(
            &config.app_options.application_name,
            options,
            Box::new(|_cc| Box::<MonitorModel>::new(model)),
        )
        .map_err(|e| anyhow!("Failed to launch GUI: {}", e))?;

        info!("GUI ended; closing MIDI input...");
        midi_connection.close();
        if mediator_thread.join().is_err() {
            error!("Mediator thread panicked");
        }
        Ok(())
    }
}

impl eframe::App for MonitorModel {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_monitor();

        egui::CentralPanel::default().show(ctx, |ui| {
            render_gui(self, ui);
        });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
