//! Interactive command loop.
//!
//! Reads commands and payments line by line and answers with `>> ` prefixed
//! lines. Input is read on a separate thread and forwarded over a channel;
//! `quit` (immediate or delayed) posts a stop event to the same channel, so
//! the loop ends even while the input is blocked.

use crate::error::Result;
use crate::ledger::PaymentProcessor;
use crate::money_file::MoneyFile;
use crate::parser::MoneyParser;
use crate::reporter::PaymentReporter;
use log::{debug, error, info};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

enum Event {
    Line(String),
    Eof,
    Stop,
}

/// Whether the loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Ends a running [`Controller`] loop from any thread.
#[derive(Clone)]
pub struct StopHandle(Sender<Event>);

impl StopHandle {
    pub fn stop(&self) {
        // the loop may already be gone
        let _ = self.0.send(Event::Stop);
    }
}

/// The command-line front end tying parser, ledger and reporter together.
pub struct Controller<W> {
    parser: MoneyParser,
    processor: Arc<PaymentProcessor>,
    reporter: PaymentReporter,
    directory: Option<PathBuf>,
    out: W,
    events: Sender<Event>,
    receiver: Receiver<Event>,
}

impl<W: Write> Controller<W> {
    pub fn new(
        parser: MoneyParser,
        processor: Arc<PaymentProcessor>,
        reporter: PaymentReporter,
        out: W,
    ) -> Self {
        let (events, receiver) = mpsc::channel();
        Controller {
            parser,
            processor,
            reporter,
            directory: None,
            out,
            events,
            receiver,
        }
    }

    /// Sets the directory relative file names are resolved against.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.events.clone())
    }

    /// Runs the loop until `quit`, a stop request or end of input.
    ///
    /// Automatic reporting runs for the duration of the loop.
    pub fn run<R: BufRead + Send + 'static>(&mut self, input: R) -> Result<()> {
        self.reporter.start()?;
        spawn_reader(input, self.events.clone())?;

        info!("Main loop started.");
        let result = self.event_loop();

        self.reporter.stop();
        info!("Main loop stopped.");
        result
    }

    fn event_loop(&mut self) -> Result<()> {
        self.println("Hello! Type 'help' for help.")?;

        loop {
            let event = self.receiver.recv();
            match event {
                Ok(Event::Line(line)) => {
                    debug!("line='{}'", line);
                    if self.process_line(&line)? == Flow::Quit {
                        break;
                    }
                }
                Ok(Event::Eof) | Ok(Event::Stop) | Err(_) => break,
            }
        }

        self.println("Bye!")?;
        Ok(())
    }

    /// Handles one input line.
    pub fn process_line(&mut self, line: &str) -> Result<Flow> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = args.first() else {
            return Ok(Flow::Continue);
        };

        match command {
            "quit" => return self.command_quit(&args),
            "report" => self.command_report(&args)?,
            "forex" => self.command_forex(&args)?,
            "file" => self.command_file(&args)?,
            "help" => self.command_help()?,
            _ if args.len() == 2 => self.register_payment(args[0], args[1])?,
            _ => {
                debug!("Unknown command '{}'", line.trim());
                self.println(&format!("ERROR - unknown command '{}', type 'help'", line.trim()))?;
            }
        }

        Ok(Flow::Continue)
    }

    /// Validates and registers all payments of a file.
    ///
    /// Failures are reported on the output, not returned; only output
    /// errors are.
    pub fn load_file(&mut self, name: impl AsRef<Path>) -> Result<()> {
        let path = match &self.directory {
            Some(directory) => directory.join(name),
            None => name.as_ref().to_path_buf(),
        };

        self.println(&format!("Loading file {}...", path.display()))?;

        match MoneyFile::new(self.parser.clone(), &path).load_into(&self.processor) {
            Ok(count) => self.println(&format!(
                "File {} successfully loaded ({} lines).",
                path.display(),
                count
            )),
            Err(e) => {
                error!("Cannot load file '{}': {}", path.display(), e);
                self.println(&format!(
                    "ERROR Loading file {}, aborting: {}",
                    path.display(),
                    e
                ))
            }
        }
    }

    fn register_payment(&mut self, currency: &str, amount: &str) -> Result<()> {
        let money = match self.parser.parse(currency, amount) {
            Ok(money) => money,
            Err(e) => return self.println(&format!("ERROR - invalid payment format: {}", e)),
        };

        match self.processor.register_payment(money.clone()) {
            Ok(id) => self.println(&format!("Registered payment {} as tx[{}]", money, id)),
            Err(e) => self.println(&format!("ERROR - payment {} rejected: {}", money, e)),
        }
    }

    fn command_quit(&mut self, args: &[&str]) -> Result<Flow> {
        match args.len() {
            1 => return Ok(Flow::Quit),
            2 => match args[1].parse::<u64>() {
                Ok(delay) => {
                    self.delayed_stop(Duration::from_secs(delay))?;
                    self.println("Delayed quit scheduled")?;
                }
                Err(_) => self.println(&format!("Cannot parse integer value '{}'", args[1]))?,
            },
            _ => self.println("Too many parameters")?,
        }
        Ok(Flow::Continue)
    }

    fn command_report(&mut self, args: &[&str]) -> Result<()> {
        if args.len() != 1 {
            self.println("Too many parameters")?;
        }

        if let Err(e) = self.reporter.generate_report() {
            error!("Cannot generate report: {}", e);
            self.println(&format!("ERROR - cannot generate report: {}", e))?;
        }
        Ok(())
    }

    fn command_forex(&mut self, args: &[&str]) -> Result<()> {
        if args.len() < 3 {
            return self.println("Too few parameters, type 'help'");
        }
        if args.len() > 3 {
            return self.println("Too many parameters, type 'help'");
        }

        let money = match self.parser.parse(args[1], args[2]) {
            Ok(money) => money,
            Err(e) => return self.println(&format!("ERROR - invalid forex format: {}", e)),
        };

        let Some(converter) = self.reporter.converter().cloned() else {
            return self.println("No exchange rates loaded.");
        };

        match converter.convert(&money) {
            Some(converted) => self.println(&format!("Forex {} ==> {}", money, converted)),
            None => self.println(&format!("No conversion rate for {} set", money.currency())),
        }
    }

    fn command_file(&mut self, args: &[&str]) -> Result<()> {
        if args.len() == 1 {
            self.println("Too few parameters, type 'help'")?;
        }

        for name in &args[1..] {
            self.load_file(name)?;
        }
        Ok(())
    }

    fn command_help(&mut self) -> Result<()> {
        self.println("Please enter a payment (CurrencyCode Value) or a command:")?;
        self.println("    quit [delay_in_sec]  - exits the app")?;
        self.println("    report               - prints the report immediately")?;
        self.println("    forex CURR AMOUNT    - converts currency")?;
        self.println("    file F1 [F2 [F3...]] - loads payments from file(s)")?;
        self.println("    help                 - prints this info")
    }

    fn delayed_stop(&self, delay: Duration) -> Result<()> {
        let stop = self.stop_handle();
        thread::Builder::new()
            .name("DelayedQuit".to_string())
            .spawn(move || {
                thread::sleep(delay);
                stop.stop();
            })?;
        Ok(())
    }

    fn println(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, ">> {}", text)?;
        self.out.flush()?;
        Ok(())
    }
}

fn spawn_reader<R: BufRead + Send + 'static>(input: R, events: Sender<Event>) -> Result<()> {
    thread::Builder::new()
        .name("InputReader".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Cannot read input, aborting: {}", e);
                        break;
                    }
                };
                if events.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            let _ = events.send(Event::Eof);
        })?;
    Ok(())
}
