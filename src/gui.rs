use std::time::Duration;

use egui::{Color32, RichText};

use crate::mediation::{MonitorModel, MONITOR_LOG_LENGTH};

pub fn render_gui(model: &mut MonitorModel, ui: &mut egui::Ui) {
    ui.heading("MIDI Port");
    ui.horizontal(|ui| {
        ui.label(&model.port_info.full_name);
        match model.port_info.last_received.map(|t| t.elapsed()) {
            Some(Ok(elapsed)) => {
                let color = if elapsed > Duration::from_secs(5) {
                    Color32::RED
                } else if elapsed > Duration::from_secs(1) {
                    Color32::LIGHT_YELLOW
                } else {
                    Color32::GREEN
                };
                ui.label(RichText::new(format!("{:.0}s ago", elapsed.as_secs_f32())).color(color));
            }
            _ => {
                ui.label(RichText::new("Nothing received yet").color(Color32::GRAY));
            }
        }
    });
    ui.separator();

    ui.heading("OSC Targets");
    if model.destinations.is_empty() {
        ui.label(RichText::new("None registered").color(Color32::RED));
    }
    for destination in model.destinations.iter() {
        ui.label(format!(
            "{}: {}:{}",
            destination.name, destination.address, destination.port
        ));
    }
    ui.separator();

    ui.columns(2, |columns| {
        columns[0].heading(format!("Last {} (max) MIDI messages", MONITOR_LOG_LENGTH));
        render_log(&mut columns[0], model.midi_message_log.iter(), "midi_log");
        columns[1].heading(format!("Last {} (max) OSC messages", MONITOR_LOG_LENGTH));
        render_log(&mut columns[1], model.osc_message_log.iter(), "osc_log");
    });
}

fn render_log<'a>(
    ui: &mut egui::Ui,
    log: impl DoubleEndedIterator<Item = &'a String>,
    id: &str,
) {
    let mut items = log.rev().peekable();
    if items.peek().is_none() {
        ui.label("Nothing yet");
        return;
    }
    egui::ScrollArea::vertical()
        .id_source(id)
        .auto_shrink([true; 2])
        .show(ui, |ui| {
            for item in items {
                ui.label(item);
            }
        });
}
