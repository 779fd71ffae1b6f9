use dosewatch_core::{Reporter, Toast, ToastLevel};

/// Prints toasts to stdout for interactive commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, toast: Toast) {
        println!("{} {}", marker(toast.level), toast.message);
    }
}

fn marker(level: ToastLevel) -> &'static str {
    match level {
        ToastLevel::Loading => "...",
        ToastLevel::Info => "[i]",
        ToastLevel::Success => "[ok]",
        ToastLevel::Error => "[!!]",
    }
}
