//! Symbol resolution for stack traces.
//!
//! [`Symbolize`] turns an instruction address into the function containing
//! it and, when debugging information is available, a source location.
//!
//! Two resolvers are provided:
//! - [`SymbolTable`], filled in by hand.
//! - [`DwarfSymbols`], loaded from an ELF image with its symbol table and
//!   DWARF line information.

use alloc::{borrow::Cow, collections::BTreeMap, string::String, sync::Arc};
use addr2line::Context;

/// A resolved instruction address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    /// Name of the function.
    pub name: String,
    /// Address of the first instruction of the function.
    pub addr: u32,
    /// Source file.
    pub file: Option<String>,
    /// Source line.
    pub line: Option<u32>,
}

impl Symbol {
    /// Offset of `pc` from the start of the function.
    pub fn offset(&self, pc: u32) -> u32 {
        pc.wrapping_sub(self.addr)
    }
}

/// Resolves addresses into symbols.
pub trait Symbolize {
    /// The function containing `pc`.
    fn resolve(&self, pc: u32) -> Option<Symbol>;

    /// Address of the symbol called `name`.
    fn address_of(&self, name: &str) -> Option<u32>;
}

#[derive(Clone, Debug)]
struct Entry {
    name: String,
    size: u32,
}

/// An in-memory symbol table.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<u32, Entry>,
    lines: BTreeMap<u32, (String, u32)>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol of `size` bytes at `addr`. A size of `0` means the symbol
    /// extends up to the next one.
    pub fn insert(&mut self, name: &str, addr: u32, size: u32) {
        self.symbols.insert(
            addr,
            Entry {
                name: String::from(name),
                size,
            },
        );
    }

    /// Add a symbol read from an object file. Symbols that do not fit the
    /// 32-bit address space are skipped.
    fn insert_object(&mut self, name: &str, addr: u64, size: u64) -> bool {
        match (u32::try_from(addr), u32::try_from(size)) {
            (Ok(addr), Ok(size)) => {
                self.insert(name, addr, size);
                true
            }
            _ => false,
        }
    }

    /// Record that code starting at `addr` comes from `file:line`.
    pub fn insert_line(&mut self, addr: u32, file: &str, line: u32) {
        self.lines.insert(addr, (String::from(file), line));
    }

    fn function(&self, pc: u32) -> Option<(u32, &Entry)> {
        let (&addr, entry) = self.symbols.range(..=pc).next_back()?;
        if entry.size == 0 || pc - addr < entry.size {
            Some((addr, entry))
        } else {
            None
        }
    }
}

impl Symbolize for SymbolTable {
    fn resolve(&self, pc: u32) -> Option<Symbol> {
        let (addr, entry) = self.function(pc)?;
        let line = self
            .lines
            .range(addr..=pc)
            .next_back()
            .map(|(_, line)| line.clone());
        Some(Symbol {
            name: entry.name.clone(),
            addr,
            file: line.as_ref().map(|(file, _)| file.clone()),
            line: line.map(|(_, line)| line),
        })
    }

    fn address_of(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(&addr, _)| addr)
    }
}

/// Failed to load a symbol source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolError {
    /// The image is not an object file this build understands.
    BadImage,
    /// The DWARF sections could not be loaded.
    BadDwarf,
}

/// Symbols and line information of an ELF image.
pub struct DwarfSymbols {
    table: SymbolTable,
    context: Option<Context<gimli::EndianArcSlice<gimli::LittleEndian>>>,
}

impl DwarfSymbols {
    /// Load the symbol table and debugging information of `image`.
    ///
    /// An image without usable DWARF still resolves function names.
    pub fn from_image(image: &[u8]) -> Result<Self, SymbolError> {
        use object::{Object, ObjectSection, ObjectSymbol};

        let file = object::File::parse(image).map_err(|_| SymbolError::BadImage)?;
        let mut table = SymbolTable::new();
        for symbol in file.symbols() {
            if let Ok(name) = symbol.name()
                && !name.is_empty()
                && symbol.is_definition()
            {
                table.insert_object(name, symbol.address(), symbol.size());
            }
        }
        let dwarf = gimli::Dwarf::load(|id| -> Result<_, SymbolError> {
            let data = file
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(Cow::Borrowed(&[]));
            let data: Arc<[u8]> = Arc::from(data.as_ref());
            Ok(gimli::EndianArcSlice::new(data, gimli::LittleEndian))
        })
        .map_err(|_| SymbolError::BadDwarf)?;
        Ok(Self {
            table,
            context: Context::from_dwarf(dwarf).ok(),
        })
    }
}

impl Symbolize for DwarfSymbols {
    fn resolve(&self, pc: u32) -> Option<Symbol> {
        let mut symbol = self.table.resolve(pc);
        let Some(ctxt) = self.context.as_ref() else {
            return symbol;
        };
        if symbol.is_none()
            && let Ok(mut frames) = ctxt.find_frames(pc as u64)
            && let Ok(Some(frame)) = frames.next()
            && let Some(Ok(name)) = frame.function.as_ref().map(|n| n.demangle())
        {
            symbol = Some(Symbol {
                name: String::from(name.as_ref()),
                addr: pc,
                file: None,
                line: None,
            });
        }
        if let Some(symbol) = symbol.as_mut()
            && let Ok(Some(location)) = ctxt.find_location(pc as u64)
        {
            symbol.file = location.file.map(String::from);
            symbol.line = location.line;
        }
        symbol
    }

    fn address_of(&self, name: &str) -> Option<u32> {
        self.table.address_of(name)
    }
}
