//! [Context]: the single mutable record threaded through one compilation

use std::collections::HashMap;

/// Category of an opcode/directive, drives how `assemble_line` parses its
/// operands. Mirrors `spec.md` §3's instruction-set table categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Binary,
    Unary,
    Zero,
    Branch,
    SpMove,
    Osix,
    Spec,
    MacroCtl,
    MacroInstr,
}

fn builtin_instructions() -> HashMap<&'static str, (u8, Category)> {
    use Category::*;
    HashMap::from([
        ("move", (0x00, Binary)),
        ("add", (0x10, Binary)),
        ("addc", (0x20, Binary)),
        ("sub", (0x30, Binary)),
        ("and", (0x40, Binary)),
        ("or", (0x50, Binary)),
        ("xor", (0x60, Binary)),
        ("cmp", (0x70, Binary)),
        ("not", (0x80, Unary)),
        ("neg", (0x84, Unary)),
        ("dec", (0x88, Unary)),
        ("inc", (0x8C, Unary)),
        ("shr", (0x90, Unary)),
        ("shla", (0x94, Unary)),
        ("shra", (0x98, Unary)),
        ("swan", (0x9C, Unary)),
        ("st", (0xA0, Binary)),
        ("ld", (0xB0, Binary)),
        ("ldc", (0xF0, Binary)),
        ("push", (0xC0, Unary)),
        ("pop", (0xC4, Unary)),
        ("ldsa", (0xC8, Unary)),
        ("addsp", (0xCC, SpMove)),
        ("setsp", (0xCD, SpMove)),
        ("pushall", (0xCE, Zero)),
        ("popall", (0xCF, Zero)),
        ("ldi", (0xD0, Unary)),
        ("halt", (0xD4, Zero)),
        ("wait", (0xD5, Zero)),
        ("jsr", (0xD6, Branch)),
        ("rts", (0xD7, Zero)),
        ("ioi", (0xD8, Zero)),
        ("rti", (0xD9, Zero)),
        ("crc", (0xDA, Zero)),
        ("beq", (0xE0, Branch)),
        ("bz", (0xE0, Branch)),
        ("bne", (0xE1, Branch)),
        ("bnz", (0xE1, Branch)),
        ("bhs", (0xE2, Branch)),
        ("bcs", (0xE2, Branch)),
        ("blo", (0xE3, Branch)),
        ("bcc", (0xE3, Branch)),
        ("bmi", (0xE4, Branch)),
        ("bpl", (0xE5, Branch)),
        ("bvs", (0xE6, Branch)),
        ("bvc", (0xE7, Branch)),
        ("bhi", (0xE8, Branch)),
        ("bls", (0xE9, Branch)),
        ("bge", (0xEA, Branch)),
        ("blt", (0xEB, Branch)),
        ("bgt", (0xEC, Branch)),
        ("ble", (0xED, Branch)),
        ("br", (0xEE, Branch)),
        ("noop", (0xEF, Branch)),
        ("lchk", (0x00, Branch)),
        ("asect", (0, Spec)),
        ("rsect", (0, Spec)),
        ("tplate", (0, Spec)),
        ("ext", (0, Spec)),
        ("ds", (0, Spec)),
        ("dc", (0, Spec)),
        ("set", (0, Spec)),
        ("macro", (0, MacroCtl)),
        ("mend", (0, MacroCtl)),
        ("end", (0, Spec)),
    ])
}

/// The single mutable state record for one assembler run.
///
/// Field-for-field grounded in `spec.md` §3's Context table and
/// `cocas.py`'s `Context.__init__`.
pub struct Context {
    /// Mark-3-architecture compatibility mode: rejects `ldsa`/`addsp`/
    /// `setsp`/`pushall`/`popall` when true.
    pub v3: bool,
    pub dbg: bool,
    pub lst_me: bool,

    pub text: Vec<String>,
    pub generated: Vec<bool>,

    pub counter: u32,
    pub sect_name: Option<String>,
    pub rel: bool,
    pub rsects: HashMap<String, u32>,

    pub labels: HashMap<String, HashMap<String, u32>>,
    pub abses: HashMap<String, u32>,
    pub ents: HashMap<String, HashMap<String, u32>>,
    pub exts: HashMap<String, Vec<(String, u32)>>,
    pub rel_list: HashMap<String, Vec<u32>>,

    pub tpls: HashMap<String, HashMap<String, u32>>,
    pub tpl: bool,
    pub tpl_name: String,
    pub ds_ins: bool,

    pub macros: HashMap<String, Vec<String>>,
    pub mvars: HashMap<String, String>,
    pub mstack: [Vec<String>; 6],
    pub pars: Vec<String>,
    pub mcount: u32,
    pub mcalls: u32,
    pub macdef: bool,
    pub mname: String,
    pub marity: usize,

    pub got_minus: bool,

    pub iset: HashMap<String, (u8, Category)>,
}

pub const MAX_MACRO_EXPANSIONS: u32 = 800;

impl Context {
    pub fn new(v3: bool) -> Context {
        let mut labels = HashMap::new();
        labels.insert("$abs".to_string(), HashMap::new());
        let mut ents = HashMap::new();
        ents.insert("$abs".to_string(), HashMap::new());

        let iset = builtin_instructions()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Context {
            v3,
            dbg: false,
            lst_me: false,
            text: Vec::new(),
            generated: Vec::new(),
            counter: 0,
            sect_name: None,
            rel: false,
            rsects: HashMap::new(),
            labels,
            abses: HashMap::new(),
            ents,
            exts: HashMap::new(),
            rel_list: HashMap::new(),
            tpls: HashMap::new(),
            tpl: false,
            tpl_name: String::new(),
            ds_ins: false,
            macros: HashMap::new(),
            mvars: HashMap::new(),
            mstack: Default::default(),
            pars: Vec::new(),
            mcount: 1,
            mcalls: 0,
            macdef: false,
            mname: String::new(),
            marity: 0,
            got_minus: false,
            iset,
        }
    }

    /// Does the current position lie in a relocatable context (a real
    /// `rsect`, as opposed to `$abs` or inside a `tplate`)?
    pub fn rel_context(&self) -> bool {
        matches!(&self.sect_name, Some(name) if name != "$abs")
    }
}
