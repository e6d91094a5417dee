use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::features::{
    money,
    validation::{parse_amount, validate_name, validate_secret},
    write_statement, AccountNo, Registry, StoreError, Transaction,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct AtmConfig {
    /// How many entries "Transaction history" shows
    pub history_limit: usize,
    /// Failed logins allowed before the card is blocked for the session
    pub max_login_attempts: u32,
}

impl Default for AtmConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            max_login_attempts: 3,
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

/// Text menus over any line-based input. Every change goes through the
/// registry, which has already persisted it by the time we print a result.
pub struct Atm<'r, R, W> {
    registry: &'r mut Registry,
    input: R,
    output: W,
    config: AtmConfig,
}

impl<'r, R: BufRead, W: Write> Atm<'r, R, W> {
    pub fn new(registry: &'r mut Registry, input: R, output: W, config: AtmConfig) -> Self {
        Self {
            registry,
            input,
            output,
            config,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        writeln!(self.output, "Welcome to the ATM")?;

        loop {
            writeln!(self.output, "\n1. Signup\n2. Login\n3. Exit")?;
            let choice = match self.prompt("Choose an option: ")? {
                Some(choice) => choice,
                None => break,
            };

            match choice.trim() {
                "1" => self.signup()?,
                "2" => {
                    if let Flow::Exit = self.login()? {
                        break;
                    }
                }
                "3" => break,
                _ => writeln!(self.output, "Invalid option. Please try again.")?,
            }
        }

        writeln!(self.output, "Thank you for using the ATM. Goodbye!")?;
        Ok(())
    }

    fn signup(&mut self) -> anyhow::Result<()> {
        let name = loop {
            let raw = match self.prompt("Enter your name: ")? {
                Some(raw) => raw,
                None => return Ok(()),
            };
            match validate_name(&raw) {
                Ok(name) => break name.to_owned(),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        };

        let secret = loop {
            let text = "Create a password (min 6 chars, letters and numbers): ";
            let raw = match self.prompt(text)? {
                Some(raw) => raw,
                None => return Ok(()),
            };
            match validate_secret(&raw) {
                Ok(secret) => break secret.to_owned(),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        };

        match self.registry.create_account(&name, &secret) {
            Ok(account_no) => writeln!(
                self.output,
                "Account created successfully! Your account number is {account_no}"
            )?,
            Err(e) => writeln!(self.output, "{e}")?,
        }
        Ok(())
    }

    fn login(&mut self) -> anyhow::Result<Flow> {
        let max = self.config.max_login_attempts;

        for attempt in 1..=max {
            let account_no = match self.prompt("Enter account number: ")? {
                Some(raw) => raw,
                None => return Ok(Flow::Exit),
            };
            let secret = match self.prompt("Enter password: ")? {
                Some(raw) => raw,
                None => return Ok(Flow::Exit),
            };

            let signed_in = self
                .registry
                .authenticate(&account_no, &secret)
                .map(|account| (account.account_no().clone(), account.name().to_owned()));

            match signed_in {
                Ok((account_no, name)) => {
                    writeln!(self.output, "Welcome back, {name}!")?;
                    info!("Account {account_no} signed in");
                    return self.account_menu(&account_no, &name);
                }
                Err(e) => {
                    writeln!(self.output, "{e}. Tries left: {}", max - attempt)?;
                }
            }
        }

        writeln!(self.output, "Your card is blocked for this session.")?;
        warn!("Login locked after {max} failed attempts");
        Ok(Flow::Exit)
    }

    fn account_menu(&mut self, account_no: &AccountNo, name: &str) -> anyhow::Result<Flow> {
        let me = account_no.as_str();

        loop {
            writeln!(
                self.output,
                "\n1. Check balance\n2. Deposit\n3. Withdraw\n4. Transfer\n\
                 5. Transaction history\n6. Export statement\n7. Logout"
            )?;
            let choice = match self.prompt("Choose an option: ")? {
                Some(choice) => choice,
                None => return Ok(Flow::Exit),
            };

            match choice.trim() {
                "1" => {
                    let balance = self.registry.balance(me)?;
                    writeln!(self.output, "Current balance: {}", money::format(balance))?;
                }
                "2" => {
                    let amount = match self.prompt_amount("Enter deposit amount: $")? {
                        Some(amount) => amount,
                        None => return Ok(Flow::Exit),
                    };
                    let outcome = self.registry.deposit(me, amount);
                    self.report(outcome, |tx| {
                        format!(
                            "Deposited {}. New balance: {}",
                            money::format(tx.amount()),
                            money::format(tx.resulting_balance())
                        )
                    })?;
                }
                "3" => {
                    let amount = match self.prompt_amount("Enter withdrawal amount: $")? {
                        Some(amount) => amount,
                        None => return Ok(Flow::Exit),
                    };
                    let outcome = self.registry.withdraw(me, amount);
                    self.report(outcome, |tx| {
                        format!(
                            "Withdrew {}. New balance: {}",
                            money::format(tx.amount()),
                            money::format(tx.resulting_balance())
                        )
                    })?;
                }
                "4" => {
                    let target = match self.prompt("Enter target account number: ")? {
                        Some(raw) => AccountNo::from(raw.as_str()),
                        None => return Ok(Flow::Exit),
                    };
                    let amount = match self.prompt_amount("Enter transfer amount: $")? {
                        Some(amount) => amount,
                        None => return Ok(Flow::Exit),
                    };
                    let outcome = self.registry.transfer(me, target.as_str(), amount);
                    self.report(outcome, |tx| {
                        format!(
                            "Transferred {} to {target}. New balance: {}",
                            money::format(tx.amount()),
                            money::format(tx.resulting_balance())
                        )
                    })?;
                }
                "5" => self.show_history(me)?,
                "6" => self.export(account_no)?,
                "7" => {
                    writeln!(self.output, "Goodbye, {name}!")?;
                    return Ok(Flow::Continue);
                }
                _ => writeln!(self.output, "Invalid option. Please try again.")?,
            }
        }
    }

    fn show_history(&mut self, account_no: &str) -> anyhow::Result<()> {
        let history = self.registry.history(account_no, self.config.history_limit)?;
        if history.is_empty() {
            writeln!(self.output, "No transactions yet.")?;
            return Ok(());
        }

        writeln!(self.output, "Last transactions:")?;
        for tx in history {
            writeln!(
                self.output,
                "  {}  |  {:13}  |  {:>12}  |  Bal: {:>12}  |  {}",
                tx.timestamp().format("%Y-%m-%d %H:%M:%S"),
                tx.kind().label(),
                money::format(tx.amount()),
                money::format(tx.resulting_balance()),
                tx.note()
            )?;
        }
        Ok(())
    }

    fn export(&mut self, account_no: &AccountNo) -> anyhow::Result<()> {
        let default_path = format!("statement_{account_no}.csv");
        let raw = match self.prompt(&format!("Statement file [{default_path}]: "))? {
            Some(raw) => raw,
            None => return Ok(()),
        };
        let path = match raw.trim() {
            "" => PathBuf::from(default_path),
            given => PathBuf::from(given),
        };

        match self.write_statement_file(account_no, &path) {
            Ok(rows) => writeln!(
                self.output,
                "Wrote {rows} transactions to {}",
                path.display()
            )?,
            Err(e) => {
                warn!("Statement export failed: {e:#}");
                writeln!(self.output, "{e:#}")?;
            }
        }
        Ok(())
    }

    fn write_statement_file(&self, account_no: &AccountNo, path: &Path) -> anyhow::Result<usize> {
        let account = self.registry.get(account_no.as_str())?;
        let file = File::create(path)
            .with_context(|| format!("Unable to create statement file {}", path.display()))?;
        let rows = write_statement(file, account)
            .with_context(|| format!("Unable to write statement to {}", path.display()))?;
        Ok(rows)
    }

    /// Print the success line or the refusal; neither ends the session.
    fn report(
        &mut self,
        outcome: Result<Transaction, StoreError>,
        describe: impl FnOnce(&Transaction) -> String,
    ) -> anyhow::Result<()> {
        match outcome {
            Ok(tx) => writeln!(self.output, "{}", describe(&tx))?,
            Err(e) => writeln!(self.output, "{e}")?,
        }
        Ok(())
    }

    /// Ask until the answer is a usable amount. `None` on end of input.
    fn prompt_amount(&mut self, text: &str) -> anyhow::Result<Option<Decimal>> {
        loop {
            let raw = match self.prompt(text)? {
                Some(raw) => raw,
                None => return Ok(None),
            };
            match parse_amount(&raw) {
                Ok(amount) => return Ok(Some(amount)),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }

    /// One line of input without its line ending. `None` on end of input.
    fn prompt(&mut self, text: &str) -> anyhow::Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Unable to read from input")?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }
}
