//! Instruction set of the stack VM.
//!
//! Every opcode is one byte. Operands follow it big-endian, with a fixed width per
//! opcode except for `CLOSURE`, whose capture list is terminated by
//! [`CLOSURE_TERMINATOR`].

/// Ends the capture list of a `CLOSURE` instruction.
pub const CLOSURE_TERMINATOR: u8 = 0xFF;
/// Capture flag: copy a local of the enclosing activation.
pub const UPVALUE_LOCAL_FLAG: u8 = 0x01;
/// Capture flag: a 16-bit index follows instead of an 8-bit one.
pub const UPVALUE_LONG_INDEX_FLAG: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Stack ============
    Noop = 0,
    Pop,
    Dup,
    Nil,
    True,
    False,
    /// Push the receiver (slot 0)
    SelfValue,

    // ============ Literals ============
    LoadInt0,
    LoadInt1,
    LoadInt2,
    LoadInt3,
    LoadInt4,
    LoadInt5,
    /// LOAD_INT_8 <value:i8>
    LoadInt8,
    LoadValue0,
    LoadValue1,
    LoadValue2,
    LoadValue3,
    /// LOAD_VALUE8 <index:u8>
    LoadValue8,
    /// LOAD_VALUE16 <index:u16>
    LoadValue16,

    // ============ Locals ============
    /// Reserve stack space for locals: PREP_LOCALS8 <count:u8>
    PrepLocals8,
    PrepLocals16,
    GetLocal1,
    GetLocal2,
    GetLocal3,
    GetLocal4,
    GetLocal8,
    GetLocal16,
    SetLocal1,
    SetLocal2,
    SetLocal3,
    SetLocal4,
    SetLocal8,
    SetLocal16,

    // ============ Upvalues ============
    GetUpvalue0,
    GetUpvalue1,
    GetUpvalue8,
    GetUpvalue16,
    SetUpvalue0,
    SetUpvalue1,
    SetUpvalue8,
    SetUpvalue16,
    /// Move a captured stack slot into its own cell
    CloseUpvalue1,
    CloseUpvalue2,
    CloseUpvalue3,
    CloseUpvalue4,
    CloseUpvalue8,
    CloseUpvalue16,
    /// CLOSURE <fn:u16> (<flags:u8> <index:u8|u16>)* 0xFF
    Closure,

    // ============ Namespaces ============
    /// Push the constant named by a symbol in the pool: GET_CONST8 <index:u8>
    GetConst8,
    GetConst16,
    /// [namespace, name, value] -> []
    DefConst,
    /// [parent, name] -> [] : DEF_NAMESPACE <kind:u8>
    DefNamespace,
    /// [class, superclass] -> []
    SetSuperclass,
    /// [namespace, mixin] -> []
    Include,
    /// [namespace] -> [singleton]
    GetSingleton,
    /// [namespace, ivar table] -> []
    DefIvars,
    /// [namespace, function, name] -> []
    DefMethod,
    /// [namespace, name] -> []
    DefGetter,
    DefSetter,
    /// [namespace, new name, old name] -> []
    DefMethodAlias,
    /// [namespace, body] -> [] : run body with namespace as self
    InitNamespace,
    /// [function] -> [result]
    Exec,

    // ============ Instance variables ============
    GetIvar8,
    GetIvar16,
    SetIvar8,
    SetIvar16,
    /// Name-indexed access resolved against the receiver's class
    GetIvarName8,
    GetIvarName16,
    SetIvarName8,
    SetIvarName16,

    // ============ Operators ============
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Negate,
    Not,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // ============ Jumps ============
    /// Forward: JUMP <offset:u16>
    Jump,
    /// Backward: LOOP <offset:u16>
    Loop,
    /// Pop, jump if falsy
    JumpUnless,
    /// Pop, jump if truthy
    JumpIf,
    /// Jump if falsy, keep the value
    JumpUnlessNp,
    /// Jump if truthy, keep the value
    JumpIfNp,
    /// Pop, jump unless the value is the undefined marker
    JumpUnlessUndef,

    // ============ Calls ============
    /// CALL_METHOD8 <name:u8> <argc:u8>
    CallMethod8,
    CallMethod16,
    CallSelf8,
    CallSelf16,
    /// CALL <argc:u8>
    Call,
    /// [class, args...] -> [instance] : INSTANTIATE8 <argc:u8>
    Instantiate8,

    // ============ Collections ============
    NewList8,
    NewList16,
    NewTuple8,
    NewTuple16,
    /// Operand counts key/value pairs
    NewMap8,
    NewMap16,
    Subscript,

    // ============ Pattern support ============
    /// [value, class] -> [bool]
    IsA,
    /// [collection] -> [int]
    Len,
    /// [map, key] -> [bool]
    HasKey,
    /// [sequence] -> [list] : SLICE <start:u8> <trailing:u8>
    Slice,

    // ============ Control ============
    Throw,
    Return,
}

impl OpCode {
    const LAST: OpCode = OpCode::Return;

    /// Fixed operand width in bytes. `CLOSURE` reports only its function index.
    pub fn operand_size(self) -> usize {
        use OpCode::*;
        match self {
            LoadInt8 | LoadValue8 | PrepLocals8 | GetLocal8 | SetLocal8 | GetUpvalue8
            | SetUpvalue8 | CloseUpvalue8 | GetConst8 | DefNamespace | GetIvar8 | SetIvar8
            | GetIvarName8 | SetIvarName8 | Call | Instantiate8 | NewList8 | NewTuple8
            | NewMap8 => 1,

            LoadValue16 | PrepLocals16 | GetLocal16 | SetLocal16 | GetUpvalue16
            | SetUpvalue16 | CloseUpvalue16 | GetConst16 | GetIvar16 | SetIvar16
            | GetIvarName16 | SetIvarName16 | NewList16 | NewTuple16 | NewMap16 | Jump
            | Loop | JumpUnless | JumpIf | JumpUnlessNp | JumpIfNp | JumpUnlessUndef
            | CallMethod8 | CallSelf8 | Slice | Closure => 2,

            CallMethod16 | CallSelf16 => 3,

            _ => 0,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::Loop
                | OpCode::JumpUnless
                | OpCode::JumpIf
                | OpCode::JumpUnlessNp
                | OpCode::JumpIfNp
                | OpCode::JumpUnlessUndef
        )
    }

    pub fn from_u8(byte: u8) -> Option<OpCode> {
        if byte <= OpCode::LAST as u8 {
            // Variants are numbered densely from 0 up to LAST.
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Noop => "NOOP",
            Pop => "POP",
            Dup => "DUP",
            Nil => "NIL",
            True => "TRUE",
            False => "FALSE",
            SelfValue => "SELF",
            LoadInt0 => "LOAD_INT_0",
            LoadInt1 => "LOAD_INT_1",
            LoadInt2 => "LOAD_INT_2",
            LoadInt3 => "LOAD_INT_3",
            LoadInt4 => "LOAD_INT_4",
            LoadInt5 => "LOAD_INT_5",
            LoadInt8 => "LOAD_INT_8",
            LoadValue0 => "LOAD_VALUE_0",
            LoadValue1 => "LOAD_VALUE_1",
            LoadValue2 => "LOAD_VALUE_2",
            LoadValue3 => "LOAD_VALUE_3",
            LoadValue8 => "LOAD_VALUE8",
            LoadValue16 => "LOAD_VALUE16",
            PrepLocals8 => "PREP_LOCALS8",
            PrepLocals16 => "PREP_LOCALS16",
            GetLocal1 => "GET_LOCAL_1",
            GetLocal2 => "GET_LOCAL_2",
            GetLocal3 => "GET_LOCAL_3",
            GetLocal4 => "GET_LOCAL_4",
            GetLocal8 => "GET_LOCAL8",
            GetLocal16 => "GET_LOCAL16",
            SetLocal1 => "SET_LOCAL_1",
            SetLocal2 => "SET_LOCAL_2",
            SetLocal3 => "SET_LOCAL_3",
            SetLocal4 => "SET_LOCAL_4",
            SetLocal8 => "SET_LOCAL8",
            SetLocal16 => "SET_LOCAL16",
            GetUpvalue0 => "GET_UPVALUE_0",
            GetUpvalue1 => "GET_UPVALUE_1",
            GetUpvalue8 => "GET_UPVALUE8",
            GetUpvalue16 => "GET_UPVALUE16",
            SetUpvalue0 => "SET_UPVALUE_0",
            SetUpvalue1 => "SET_UPVALUE_1",
            SetUpvalue8 => "SET_UPVALUE8",
            SetUpvalue16 => "SET_UPVALUE16",
            CloseUpvalue1 => "CLOSE_UPVALUE_1",
            CloseUpvalue2 => "CLOSE_UPVALUE_2",
            CloseUpvalue3 => "CLOSE_UPVALUE_3",
            CloseUpvalue4 => "CLOSE_UPVALUE_4",
            CloseUpvalue8 => "CLOSE_UPVALUE8",
            CloseUpvalue16 => "CLOSE_UPVALUE16",
            Closure => "CLOSURE",
            GetConst8 => "GET_CONST8",
            GetConst16 => "GET_CONST16",
            DefConst => "DEF_CONST",
            DefNamespace => "DEF_NAMESPACE",
            SetSuperclass => "SET_SUPERCLASS",
            Include => "INCLUDE",
            GetSingleton => "GET_SINGLETON",
            DefIvars => "DEF_IVARS",
            DefMethod => "DEF_METHOD",
            DefGetter => "DEF_GETTER",
            DefSetter => "DEF_SETTER",
            DefMethodAlias => "DEF_METHOD_ALIAS",
            InitNamespace => "INIT_NAMESPACE",
            Exec => "EXEC",
            GetIvar8 => "GET_IVAR8",
            GetIvar16 => "GET_IVAR16",
            SetIvar8 => "SET_IVAR8",
            SetIvar16 => "SET_IVAR16",
            GetIvarName8 => "GET_IVAR_NAME8",
            GetIvarName16 => "GET_IVAR_NAME16",
            SetIvarName8 => "SET_IVAR_NAME8",
            SetIvarName16 => "SET_IVAR_NAME16",
            Add => "ADD",
            Subtract => "SUBTRACT",
            Multiply => "MULTIPLY",
            Divide => "DIVIDE",
            Modulo => "MODULO",
            Negate => "NEGATE",
            Not => "NOT",
            Equal => "EQUAL",
            NotEqual => "NOT_EQUAL",
            Less => "LESS",
            LessEqual => "LESS_EQUAL",
            Greater => "GREATER",
            GreaterEqual => "GREATER_EQUAL",
            Jump => "JUMP",
            Loop => "LOOP",
            JumpUnless => "JUMP_UNLESS",
            JumpIf => "JUMP_IF",
            JumpUnlessNp => "JUMP_UNLESS_NP",
            JumpIfNp => "JUMP_IF_NP",
            JumpUnlessUndef => "JUMP_UNLESS_UNDEF",
            CallMethod8 => "CALL_METHOD8",
            CallMethod16 => "CALL_METHOD16",
            CallSelf8 => "CALL_SELF8",
            CallSelf16 => "CALL_SELF16",
            Call => "CALL",
            Instantiate8 => "INSTANTIATE8",
            NewList8 => "NEW_LIST8",
            NewList16 => "NEW_LIST16",
            NewTuple8 => "NEW_TUPLE8",
            NewTuple16 => "NEW_TUPLE16",
            NewMap8 => "NEW_MAP8",
            NewMap16 => "NEW_MAP16",
            Subscript => "SUBSCRIPT",
            IsA => "IS_A",
            Len => "LEN",
            HasKey => "HAS_KEY",
            Slice => "SLICE",
            Throw => "THROW",
            Return => "RETURN",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

/// How an indexed operand ends up encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Operand-free opcode for a small index.
    Dedicated(OpCode),
    Short(OpCode, u8),
    Long(OpCode, u16),
}

/// A group of opcodes addressing the same thing by index: dedicated forms for the
/// lowest indices, then an 8-bit and a 16-bit operand form.
#[derive(Debug, Clone, Copy)]
pub struct IndexedFamily {
    pub dedicated: &'static [OpCode],
    /// Index addressed by `dedicated[0]`.
    pub first_dedicated: usize,
    pub short: OpCode,
    pub long: OpCode,
}

impl IndexedFamily {
    /// Picks the encoding for `index`; `None` once it does not fit in 16 bits.
    pub fn select(&self, index: usize) -> Option<Encoding> {
        if let Some(offset) = index.checked_sub(self.first_dedicated) {
            if let Some(&op) = self.dedicated.get(offset) {
                return Some(Encoding::Dedicated(op));
            }
        }
        if let Ok(short) = u8::try_from(index) {
            return Some(Encoding::Short(self.short, short));
        }
        u16::try_from(index)
            .ok()
            .map(|long| Encoding::Long(self.long, long))
    }
}

const fn family(
    dedicated: &'static [OpCode],
    first_dedicated: usize,
    short: OpCode,
    long: OpCode,
) -> IndexedFamily {
    IndexedFamily {
        dedicated,
        first_dedicated,
        short,
        long,
    }
}

use OpCode as Op;

pub const GET_LOCAL: IndexedFamily = family(
    &[Op::GetLocal1, Op::GetLocal2, Op::GetLocal3, Op::GetLocal4],
    1,
    Op::GetLocal8,
    Op::GetLocal16,
);
pub const SET_LOCAL: IndexedFamily = family(
    &[Op::SetLocal1, Op::SetLocal2, Op::SetLocal3, Op::SetLocal4],
    1,
    Op::SetLocal8,
    Op::SetLocal16,
);
pub const CLOSE_UPVALUE: IndexedFamily = family(
    &[
        Op::CloseUpvalue1,
        Op::CloseUpvalue2,
        Op::CloseUpvalue3,
        Op::CloseUpvalue4,
    ],
    1,
    Op::CloseUpvalue8,
    Op::CloseUpvalue16,
);
pub const GET_UPVALUE: IndexedFamily = family(
    &[Op::GetUpvalue0, Op::GetUpvalue1],
    0,
    Op::GetUpvalue8,
    Op::GetUpvalue16,
);
pub const SET_UPVALUE: IndexedFamily = family(
    &[Op::SetUpvalue0, Op::SetUpvalue1],
    0,
    Op::SetUpvalue8,
    Op::SetUpvalue16,
);
pub const LOAD_VALUE: IndexedFamily = family(
    &[Op::LoadValue0, Op::LoadValue1, Op::LoadValue2, Op::LoadValue3],
    0,
    Op::LoadValue8,
    Op::LoadValue16,
);
pub const GET_CONST: IndexedFamily = family(&[], 0, Op::GetConst8, Op::GetConst16);
pub const GET_IVAR: IndexedFamily = family(&[], 0, Op::GetIvar8, Op::GetIvar16);
pub const SET_IVAR: IndexedFamily = family(&[], 0, Op::SetIvar8, Op::SetIvar16);
pub const GET_IVAR_NAME: IndexedFamily = family(&[], 0, Op::GetIvarName8, Op::GetIvarName16);
pub const SET_IVAR_NAME: IndexedFamily = family(&[], 0, Op::SetIvarName8, Op::SetIvarName16);
pub const CALL_METHOD: IndexedFamily = family(&[], 0, Op::CallMethod8, Op::CallMethod16);
pub const CALL_SELF: IndexedFamily = family(&[], 0, Op::CallSelf8, Op::CallSelf16);
pub const PREP_LOCALS: IndexedFamily = family(&[], 0, Op::PrepLocals8, Op::PrepLocals16);
pub const NEW_LIST: IndexedFamily = family(&[], 0, Op::NewList8, Op::NewList16);
pub const NEW_TUPLE: IndexedFamily = family(&[], 0, Op::NewTuple8, Op::NewTuple16);
pub const NEW_MAP: IndexedFamily = family(&[], 0, Op::NewMap8, Op::NewMap16);

/// Dedicated opcode for a small integer literal.
pub fn small_int(value: i64) -> Option<OpCode> {
    match value {
        0 => Some(OpCode::LoadInt0),
        1 => Some(OpCode::LoadInt1),
        2 => Some(OpCode::LoadInt2),
        3 => Some(OpCode::LoadInt3),
        4 => Some(OpCode::LoadInt4),
        5 => Some(OpCode::LoadInt5),
        _ => None,
    }
}

/// Byte length of the instruction starting at `offset`, including the opcode.
pub fn instruction_len(code: &[u8], offset: usize) -> Option<usize> {
    let op = OpCode::from_u8(*code.get(offset)?)?;
    if op != OpCode::Closure {
        return Some(1 + op.operand_size());
    }
    let mut cursor = offset + 3;
    loop {
        let flags = *code.get(cursor)?;
        if flags == CLOSURE_TERMINATOR {
            return Some(cursor + 1 - offset);
        }
        cursor += if flags & UPVALUE_LONG_INDEX_FLAG != 0 { 3 } else { 2 };
    }
}

pub fn read_u16(code: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*code.get(offset)?, *code.get(offset + 1)?]))
}

/// Walks an instruction stream yielding `(offset, opcode)`; stops at the first
/// undecodable byte.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, offset: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = (usize, OpCode);

    fn next(&mut self) -> Option<Self::Item> {
        let op = OpCode::from_u8(*self.code.get(self.offset)?)?;
        let len = instruction_len(self.code, self.offset)?;
        let at = self.offset;
        self.offset += len;
        Some((at, op))
    }
}
