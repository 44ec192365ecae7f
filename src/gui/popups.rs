use eframe::egui;

/// A stack of error messages which should be shown to the user.
#[derive(Debug, Default)]
pub struct Popups {
    popups: Vec<Popup>,
    next_id: u64,
}

#[derive(Debug)]
struct Popup {
    id: u64,
    message: String,
}

impl Popups {
    /// Show a new error message to the user, including the error's context chain.
    pub fn error(&mut self, e: anyhow::Error) {
        log::error!("{e:#}");

        self.popups.push(Popup {
            id: self.next_id,
            message: format_error(&e),
        });
        self.next_id += 1;
    }

    /// Show all currently held popups.
    pub fn show(&mut self, ctx: &egui::Context) {
        self.popups.retain(|popup| {
            let mut open = true;
            let mut close_clicked = false;

            egui::Window::new("Error")
                .id(egui::Id::new(("error popup", popup.id)))
                .open(&mut open)
                .collapsible(false)
                .resizable(true)
                .default_width(480.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical()
                        .max_height(320.0)
                        .show(ui, |ui| ui.label(&popup.message));

                    ui.separator();
                    ui.vertical_centered(|ui| {
                        close_clicked = ui.button("Close").clicked();
                    });
                });

            open && !close_clicked
        });
    }
}

fn format_error(e: &anyhow::Error) -> String {
    let mut s = format!("Error: {e}\n");

    for (idx, error) in e.chain().enumerate().skip(1) {
        s.push_str(&format!("\t{idx}. {error}\n"));
    }

    s
}
