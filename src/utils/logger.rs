use core::fmt;
use log::{self, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Board console hook, e.g. a UART `print`
pub type PrintFn = fn(fmt::Arguments);

/// Route `log` records to `print`, filtered at `level`.
pub fn init(print: PrintFn, level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    *LOGGER.0.lock() = Some(print);
    log::set_max_level(level);
    Ok(())
}

struct SimpleLogger(Mutex<Option<PrintFn>>);
static LOGGER: SimpleLogger = SimpleLogger(Mutex::new(None));

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // one line at a time
            let hold_lock = self.0.lock();
            if let Some(print) = *hold_lock {
                print(format_args!(
                    "\x1b[{}m[{}] [spi]: {}\x1b[0m\n",
                    level_to_color_code(record.level()),
                    record.level(),
                    record.args()
                ));
            }
            drop(hold_lock);
        }
    }

    fn flush(&self) {}
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}
