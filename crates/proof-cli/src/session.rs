//! Ceremony controller
//!
//! A [`Session`] walks the operator through wallet creation, cosigner import
//! and PSBT signing. It owns the store, the chain oracle and the loaded
//! wallet; all interaction goes through a [`Console`].
//!
//! Operator mistakes (a bad key, a rejected PSBT) are shown on screen and the
//! flow returns to its menu. Only console and storage failures end the
//! session.

use crate::console::{Console, Key, Screen};
use anyhow::{Context, Result};
use proof_core::{DeviceEntropy, DiceRolls, Network, WalletEntropy};
use proof_psbt::Branch;
use proof_wallet::ceremony::{self, PsbtReview};
use proof_wallet::transport;
use proof_wallet::wallet::validate_policy;
use proof_wallet::{
    ChainOracle, FingerprintSource, PendingCosigner, Wallet, WalletStore, MAX_SIGNERS,
};
use std::io;
use zeroize::Zeroizing;

/// Characters per displayed chunk of a signed PSBT
pub const CHUNK_SIZE: usize = 400;

/// Receive addresses shown per page
pub const ADDRESS_PAGE: u32 = 10;

const NO_WALLET: &str = "no wallet loaded";

pub struct Session<C, O> {
    console: C,
    oracle: O,
    store: WalletStore,
    wallet: Option<Wallet>,
}

/// Show a message and wait for Enter
fn alert<C: Console>(console: &mut C, title: &str, body: impl Into<String>) -> io::Result<()> {
    console.display(&Screen::new(format!("Proof Wallet: {}", title), body))?;
    Ok(())
}

/// Read a line; `None` when the operator types `q`
fn prompt<C: Console>(console: &mut C, text: &str) -> io::Result<Option<String>> {
    let line = console.read_line(text)?;
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}

/// PSBT chunks, one per line, ended by an empty line
fn read_chunks<C: Console>(console: &mut C) -> io::Result<Option<Vec<String>>> {
    let mut chunks = Vec::new();
    loop {
        let label = format!("Part {} (empty line when done, q to cancel):", chunks.len() + 1);
        match prompt(console, &label)? {
            None => return Ok(None),
            Some(line) if line.is_empty() => return Ok(Some(chunks)),
            Some(line) => chunks.push(line),
        }
    }
}

fn review_body(review: &PsbtReview) -> String {
    let mut body = String::new();
    let validation = &review.validation;

    if let Some(decoded) = review.decoded() {
        body.push_str(&format!(
            "Inputs: {}   Outputs: {}\n\n",
            decoded.inputs.len(),
            decoded.outputs.len()
        ));
        for out in &decoded.tx.vout {
            let address = out
                .script_pubkey
                .all_addresses()
                .first()
                .map(|a| a.to_string())
                .unwrap_or_else(|| out.script_pubkey.script_type.clone());
            let change = validation
                .change_outputs
                .iter()
                .find(|(i, _)| *i == out.n as usize)
                .map(|(_, index)| format!("  (change at m/1/{})", index))
                .unwrap_or_default();
            body.push_str(&format!("  #{} {} -> {}{}\n", out.n, out.value, address, change));
        }
        body.push('\n');
    }

    if let Some(fee) = review.fee() {
        body.push_str(&format!("Fee: {}\n", fee));
    }
    if let Some(vsize) = review.estimated_vsize() {
        body.push_str(&format!("Estimated size: {} vB\n", vsize));
    }
    if let Some(rate) = review.fee_rate_sat_vb() {
        body.push_str(&format!("Fee rate: {:.2} sat/vB\n", rate));
    }

    for line in &validation.successes {
        body.push_str(&format!("\n[ok] {}", line));
    }
    for line in validation.warning_messages() {
        body.push_str(&format!("\n[warning] {}", line));
    }
    for line in validation.error_messages() {
        body.push_str(&format!("\n[error] {}", line));
    }
    body
}

impl<C: Console, O: ChainOracle> Session<C, O> {
    pub fn new(console: C, oracle: O, store: WalletStore) -> Self {
        Self {
            console,
            oracle,
            store,
            wallet: None,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn wallet(&self) -> Option<&Wallet> {
        self.wallet.as_ref()
    }

    pub fn network(&self) -> Network {
        self.store.network()
    }

    /// Run until the operator exits from the home screen.
    pub fn run(&mut self) -> Result<()> {
        while self.home()? {}
        log::info!("Session ended");
        Ok(())
    }

    /// One pass of the home menu; false means exit.
    pub fn home(&mut self) -> Result<bool> {
        let mut body = format!("Network: {}\n\n", self.network());
        if self.network().is_mainnet() {
            body.push_str("MAINNET: real funds are at stake.\n\n");
        }
        body.push_str("1) Create wallet\n2) Restore wallet\n3) Load wallet\n4) Exit\n");
        let screen = Screen::new("Proof Wallet: Home", body).keys("1234q");

        let loaded = match self.console.display(&screen)? {
            Key::Char('1') => self.create_wallet()?,
            Key::Char('2') => self.restore_wallet()?,
            Key::Char('3') => self.load_wallet()?,
            _ => return Ok(false),
        };
        if loaded {
            self.wallet_menu()?;
        }
        Ok(true)
    }

    fn choose_policy(&mut self) -> Result<Option<(usize, usize)>> {
        let title = "Choose multisig policy";
        let Some(m) = self.choose_number(
            &format!("Required signatures M (1-{}), q to cancel:", MAX_SIGNERS),
            title,
        )?
        else {
            return Ok(None);
        };
        loop {
            let Some(n) = self.choose_number(
                &format!("Total signers N ({}-{}), q to cancel:", m, MAX_SIGNERS),
                title,
            )?
            else {
                return Ok(None);
            };
            match validate_policy(m, n) {
                Ok(()) => return Ok(Some((m, n))),
                Err(e) => alert(&mut self.console, title, e.to_string())?,
            }
        }
    }

    fn choose_number(&mut self, text: &str, title: &str) -> Result<Option<usize>> {
        loop {
            let Some(line) = prompt(&mut self.console, text)? else {
                return Ok(None);
            };
            match line.parse::<usize>() {
                Ok(v) if (1..=MAX_SIGNERS).contains(&v) => return Ok(Some(v)),
                _ => alert(
                    &mut self.console,
                    title,
                    format!("{:?} is not a number from 1 to {}", line, MAX_SIGNERS),
                )?,
            }
        }
    }

    fn roll_dice(&mut self) -> Result<Option<DiceRolls>> {
        let mut rolls = DiceRolls::new();
        loop {
            let mut body = format!(
                "Roll a casino-grade die at least {} times.\n\
                 Press 1-6 for each roll, [u] to undo, [d] when done, [q] to quit.\n\n",
                proof_core::entropy::MIN_DICE_ROLLS
            );
            for (i, row) in rolls.rows().iter().enumerate() {
                body.push_str(&format!("Rolls {:>3}-{:<3} {}\n", i * 10 + 1, i * 10 + 10, row));
            }
            body.push_str(&format!("\nCount: {}", rolls.len()));

            let screen = Screen::new("Proof Wallet: Dice Entropy", body).keys("123456udq");
            match self.console.display(&screen)? {
                Key::Char('q') => return Ok(None),
                Key::Char('u') => {
                    rolls.pop();
                }
                Key::Char('d') if rolls.is_sufficient() => return Ok(Some(rolls)),
                Key::Char('d') => {}
                Key::Char(c) => {
                    if let Some(face) = c.to_digit(10) {
                        rolls.push(face as u8)?;
                    }
                }
                Key::Enter => {}
            }
        }
    }

    fn device_entropy(&mut self) -> Result<Option<DeviceEntropy>> {
        let title = "Proof Wallet: Computer Entropy";
        let screen = Screen::new(
            title,
            "1) Generate entropy on this computer\n\
             2) Enter the entropy generated on the other Proof Wallet computer\n",
        )
        .keys("12q");
        match self.console.display(&screen)? {
            Key::Char('1') => return Ok(Some(DeviceEntropy::generate())),
            Key::Char('2') => {}
            _ => return Ok(None),
        }
        loop {
            let Some(text) = prompt(
                &mut self.console,
                "16 groups of 4 hex characters (spaces optional), q to cancel:",
            )?
            else {
                return Ok(None);
            };
            let text = Zeroizing::new(text);
            match DeviceEntropy::from_transcript(&text) {
                Ok(device) => return Ok(Some(device)),
                Err(e) => alert(&mut self.console, "Computer Entropy", e.to_string())?,
            }
        }
    }

    /// Create, review, export and save a new wallet.
    pub fn create_wallet(&mut self) -> Result<bool> {
        let Some((m, n)) = self.choose_policy()? else {
            return Ok(false);
        };
        let Some(dice) = self.roll_dice()? else {
            return Ok(false);
        };
        let Some(device) = self.device_entropy()? else {
            return Ok(false);
        };
        let entropy = WalletEntropy::new(&dice, &device)?;
        let wallet = Wallet::from_entropy(&entropy, m, n, self.network())?;

        alert(
            &mut self.console,
            "Sensitive Info Warning",
            "The next screen shows the wallet mnemonic. Anyone who sees it can \
             spend this wallet's share of the funds.\n\nPress [Enter] when ready.",
        )?;

        let mut body = Zeroizing::new(format!("Policy: {} of {}\n\nDice rolls\n", m, n));
        for row in dice.rows() {
            body.push_str(&format!("  {}\n", row));
        }
        body.push_str(&format!("\nComputer entropy\n  {}\n", device.grouped()));
        body.push_str(&format!("\n24 word mnemonic\n  {}\n", wallet.mnemonic()));
        body.push_str(
            "\nOn the second computer, enter the same dice rolls and computer \
             entropy and check that the same mnemonic appears. If it does not, \
             press [q] and stop.\n\nPress [Enter] to continue to the xpub export.",
        );
        let screen = Screen::new("Proof Wallet: Create Wallet", body.as_str())
            .keys("q")
            .with_enter();
        if self.console.display(&screen)? == Key::Char('q') {
            return Ok(false);
        }

        self.export_xpub(&wallet)?;
        let path = self
            .store
            .save(&wallet)
            .context("Failed to save new wallet")?;
        alert(
            &mut self.console,
            "Create Wallet",
            format!(
                "Wallet {} saved to {}.\n\nImport the other {} signers' xpubs \
                 from the wallet menu to finish it.",
                wallet.name(),
                path.display(),
                n - 1
            ),
        )?;
        self.wallet = Some(wallet);
        Ok(true)
    }

    /// Rebuild a wallet from its mnemonic.
    pub fn restore_wallet(&mut self) -> Result<bool> {
        let Some((m, n)) = self.choose_policy()? else {
            return Ok(false);
        };
        let wallet = loop {
            let Some(words) = prompt(&mut self.console, "24 word mnemonic, q to cancel:")? else {
                return Ok(false);
            };
            let words = Zeroizing::new(words);
            match Wallet::restore(&words, m, n, self.network()) {
                Ok(wallet) => break wallet,
                Err(e) => alert(&mut self.console, "Restore Wallet", e.to_string())?,
            }
        };

        if self.store.exists(wallet.name()) {
            let stored = self.store.load(wallet.name())?;
            let text = if (stored.m(), stored.n()) != (m, n) {
                log::warn!(
                    "Restore asked for {} of {}, wallet {} is stored as {} of {}",
                    m,
                    n,
                    stored.name(),
                    stored.m(),
                    stored.n()
                );
                format!(
                    "Wallet {} is already stored with policy {} of {}, not {} of {}.\n\
                     Loading the stored wallet.",
                    stored.name(),
                    stored.m(),
                    stored.n(),
                    m,
                    n
                )
            } else {
                format!("Wallet {} is already stored; loading it.", stored.name())
            };
            alert(&mut self.console, "Restore Wallet", text)?;
            self.wallet = Some(stored);
            return Ok(true);
        }

        let screen = Screen::new(
            "Proof Wallet: Restore Wallet",
            format!(
                "Fingerprint: {}\nPolicy: {} of {}\n\nPress [Enter] to save, [q] to cancel.",
                wallet.fingerprint(),
                m,
                n
            ),
        )
        .keys("q")
        .with_enter();
        if self.console.display(&screen)? == Key::Char('q') {
            return Ok(false);
        }
        self.store
            .save(&wallet)
            .context("Failed to save restored wallet")?;
        self.wallet = Some(wallet);
        Ok(true)
    }

    /// Pick a stored wallet by number.
    pub fn load_wallet(&mut self) -> Result<bool> {
        let names = self.store.list()?;
        if names.is_empty() {
            let msg = format!("No {} wallets in {}.", self.network(), self.store.dir().display());
            alert(&mut self.console, "Load Wallet", msg)?;
            return Ok(false);
        }

        let mut body = String::new();
        for (i, name) in names.iter().enumerate() {
            body.push_str(&format!("{}) {}\n", i + 1, name));
        }
        alert(&mut self.console, "Load Wallet", body)?;

        loop {
            let Some(choice) = prompt(&mut self.console, "Wallet number, q to cancel:")? else {
                return Ok(false);
            };
            let Some(name) = choice
                .parse::<usize>()
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| names.get(i))
            else {
                alert(&mut self.console, "Load Wallet", "No such wallet")?;
                continue;
            };
            match self.store.load(name) {
                Ok(wallet) => {
                    self.wallet = Some(wallet);
                    return Ok(true);
                }
                Err(e) => {
                    log::warn!("Could not load wallet {}: {}", name, e);
                    alert(&mut self.console, "Load Wallet", e.to_string())?;
                    return Ok(false);
                }
            }
        }
    }

    fn wallet_menu(&mut self) -> Result<()> {
        loop {
            let wallet = self.wallet.as_ref().context(NO_WALLET)?;
            let mut body = format!(
                "Policy: {} of {}\nFingerprint: {}\nNetwork: {}\nSigners: {} of {}\n\n",
                wallet.m(),
                wallet.n(),
                wallet.fingerprint(),
                wallet.network(),
                wallet.cosigners().len() + 1,
                wallet.n()
            );
            let complete = wallet.is_complete();
            if complete {
                body.push_str("1) Sign PSBT\n2) Receive addresses\n3) Export xpub\n4) Cosigners\n");
            } else {
                body.push_str(&format!(
                    "1) Import cosigner ({} remaining)\n2) Export xpub\n3) Cosigners\n",
                    wallet.cosigners().remaining(wallet.n())
                ));
            }
            body.push_str("q) Back\n");
            let screen = Screen::new(format!("Proof Wallet: {}", wallet.name()), body)
                .keys(if complete { "1234q" } else { "123q" });

            match (complete, self.console.display(&screen)?) {
                (true, Key::Char('1')) => self.sign_flow()?,
                (true, Key::Char('2')) => self.receive_flow()?,
                (true, Key::Char('3')) | (false, Key::Char('2')) => {
                    let wallet = self.wallet.as_ref().context(NO_WALLET)?;
                    let signer = wallet.local_signer();
                    alert(
                        &mut self.console,
                        "Export xpub",
                        format!(
                            "Fingerprint: {}\n\n{}\n\nTransfer this to each cosigner and \
                             to the watch-only wallet.",
                            signer.fingerprint, signer.xpub
                        ),
                    )?;
                }
                (true, Key::Char('4')) | (false, Key::Char('3')) => self.show_cosigners()?,
                (false, Key::Char('1')) => self.import_cosigner()?,
                _ => return Ok(()),
            }
        }
    }

    fn export_xpub(&mut self, wallet: &Wallet) -> Result<()> {
        alert(
            &mut self.console,
            "Export xpub",
            format!(
                "Root xpub of this wallet (fingerprint {}):\n\n{}\n\n\
                 Transfer it to the other signers and your watch-only wallet.",
                wallet.fingerprint(),
                wallet.xpub()
            ),
        )?;
        Ok(())
    }

    fn show_cosigners(&mut self) -> Result<()> {
        let wallet = self.wallet.as_ref().context(NO_WALLET)?;
        let mut body = format!("* {} {} (this wallet)\n", wallet.fingerprint(), wallet.xpub());
        for cosigner in wallet.cosigners().list() {
            body.push_str(&format!("  {} {}\n", cosigner.fingerprint, cosigner.xpub));
        }
        alert(&mut self.console, "Cosigners", body)?;
        Ok(())
    }

    /// Validate, confirm and append one cosigner, then save.
    pub fn import_cosigner(&mut self) -> Result<()> {
        let network = self.network();
        let Some(text) = prompt(&mut self.console, "Cosigner xpub, q to cancel:")? else {
            return Ok(());
        };

        let screen = Screen::new(
            "Proof Wallet: Cosigner Fingerprint",
            "d) Derive the fingerprint from the key (master xpub)\n\
             m) Enter the fingerprint manually\n",
        )
        .keys("dmq");
        let source = match self.console.display(&screen)? {
            Key::Char('d') => FingerprintSource::Derived,
            Key::Char('m') => match prompt(&mut self.console, "Fingerprint (8 hex), q to cancel:")? {
                Some(hex) => FingerprintSource::Manual(hex),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        let pending = match PendingCosigner::prepare(&self.oracle, &text, network, source) {
            Ok(pending) => pending,
            Err(e) => {
                log::warn!("Cosigner rejected: {}", e);
                alert(&mut self.console, "Import Cosigner", e.to_string())?;
                return Ok(());
            }
        };

        let mut body = format!("Fingerprint: {}\n", pending.fingerprint());
        if pending.fingerprint() != pending.derived_fingerprint() {
            body.push_str(&format!(
                "(the key itself hashes to {})\n",
                pending.derived_fingerprint()
            ));
        }
        body.push_str(&format!(
            "\n{}\n\nPress [Enter] to add this cosigner, [u] to discard.",
            pending.xpub()
        ));
        let screen = Screen::new("Proof Wallet: Confirm Cosigner", body)
            .keys("u")
            .with_enter();
        if self.console.display(&screen)? != Key::Enter {
            return Ok(());
        }

        let wallet = self.wallet.as_mut().context(NO_WALLET)?;
        if let Err(e) = wallet.add_cosigner(pending) {
            alert(&mut self.console, "Import Cosigner", e.to_string())?;
            return Ok(());
        }
        self.store.save(wallet).context("Failed to save wallet")?;
        if wallet.is_complete() {
            let name = wallet.name().to_string();
            alert(
                &mut self.console,
                "Import Cosigner",
                format!("All signers imported. {} is ready to sign.", name),
            )?;
        }
        Ok(())
    }

    /// Read a PSBT, show the review, sign on confirmation.
    pub fn sign_flow(&mut self) -> Result<()> {
        alert(
            &mut self.console,
            "Sign PSBT",
            "Enter the PSBT as one or more base64 parts, in order, one per line.",
        )?;
        let Some(chunks) = read_chunks(&mut self.console)? else {
            return Ok(());
        };
        if chunks.is_empty() {
            return Ok(());
        }
        let psbt = transport::join_chunks(&chunks);

        let wallet = self.wallet.as_ref().context(NO_WALLET)?;
        let review = ceremony::review_psbt(&self.oracle, wallet, &psbt);
        let body = review_body(&review);

        if !review.is_signable() {
            alert(
                &mut self.console,
                "PSBT Rejected",
                format!("{}\n\nThis PSBT will not be signed.", body),
            )?;
            return Ok(());
        }

        let screen = Screen::new(
            "Proof Wallet: Review PSBT",
            format!("{}\n\nPress [s] to sign, [q] to cancel.", body),
        )
        .keys("sq");
        if self.console.display(&screen)? != Key::Char('s') {
            return Ok(());
        }

        let signed = match ceremony::sign_psbt(&self.oracle, wallet, &review) {
            Ok(signed) => signed,
            Err(e) => {
                log::warn!("Signing failed: {}", e);
                alert(&mut self.console, "Sign PSBT", e.to_string())?;
                return Ok(());
            }
        };

        let parts = transport::split_chunks(&signed.psbt, CHUNK_SIZE);
        let status = if signed.complete {
            "Fully signed: ready to finalize and broadcast."
        } else {
            "More signatures are required: pass this PSBT to the next signer."
        };
        for (i, part) in parts.iter().enumerate() {
            alert(
                &mut self.console,
                "Signed PSBT",
                format!("Part {} of {}\n\n{}\n\n{}", i + 1, parts.len(), part, status),
            )?;
        }
        Ok(())
    }

    /// Page through receive addresses.
    pub fn receive_flow(&mut self) -> Result<()> {
        let mut start = 0u32;
        loop {
            let wallet = self.wallet.as_ref().context(NO_WALLET)?;
            let end = start.saturating_add(ADDRESS_PAGE - 1);
            let addresses = match ceremony::receive_addresses(&self.oracle, wallet, (start, end))
            {
                Ok(addresses) => addresses,
                Err(e) => {
                    alert(&mut self.console, "Receive Addresses", e.to_string())?;
                    return Ok(());
                }
            };

            let mut body = String::new();
            for (index, address) in (start..).zip(&addresses) {
                body.push_str(&format!("{:>4}  {}\n", index, address));
            }
            body.push_str("\n[n] next page, [q] back");
            let screen = Screen::new("Proof Wallet: Receive Addresses", body).keys("nq");
            match self.console.display(&screen)? {
                Key::Char('n') => start = end.saturating_add(1),
                _ => return Ok(()),
            }
        }
    }
}

impl<C, O> Session<C, O> {
    /// Address of the loaded wallet at `m/<branch>/<index>`
    pub fn address(&self, branch: Branch, index: u32) -> Option<String> {
        self.wallet.as_ref()?.address(branch, index).ok()
    }
}
