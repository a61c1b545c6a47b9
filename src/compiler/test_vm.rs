//! A tiny stack machine for tests: runs the opcodes that literal, collection
//! and pattern code use, so tests can check behaviour instead of bytes.

use crate::bytecode::opcode::{read_u16, OpCode};
use crate::bytecode::{CompiledFunction, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum TestValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    List(Vec<TestValue>),
    Tuple(Vec<TestValue>),
    Map(Vec<(TestValue, TestValue)>),
    Class(String),
    Instance { class: String, args: Vec<TestValue> },
}

impl TestValue {
    fn truthy(&self) -> bool {
        !matches!(self, TestValue::Nil | TestValue::Bool(false))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned(TestValue),
    Thrown(TestValue),
}

/// Result of running a function: how it ended and its final locals, slot 0 first.
#[derive(Debug)]
pub struct Run {
    pub outcome: Outcome,
    pub locals: Vec<TestValue>,
}

impl Run {
    pub fn local(&self, slot: usize) -> Option<&TestValue> {
        self.locals.get(slot)
    }
}

pub fn run(function: &CompiledFunction) -> Run {
    let mut machine = Machine {
        function,
        stack: Vec::new(),
        locals: vec![TestValue::Nil],
        ip: 0,
    };
    let outcome = machine.execute();
    Run {
        outcome,
        locals: machine.locals,
    }
}

struct Machine<'f> {
    function: &'f CompiledFunction,
    stack: Vec<TestValue>,
    locals: Vec<TestValue>,
    ip: usize,
}

impl Machine<'_> {
    fn pop(&mut self) -> TestValue {
        self.stack.pop().expect("stack underflow")
    }

    fn pop_n(&mut self, n: usize) -> Vec<TestValue> {
        let at = self.stack.len() - n;
        self.stack.split_off(at)
    }

    fn byte(&mut self) -> u8 {
        let byte = self.function.instructions[self.ip];
        self.ip += 1;
        byte
    }

    fn short(&mut self) -> usize {
        let value = read_u16(&self.function.instructions, self.ip).expect("truncated operand");
        self.ip += 2;
        value as usize
    }

    fn constant(&self, index: usize) -> TestValue {
        match &self.function.constants[index] {
            Value::Nil => TestValue::Nil,
            Value::SmallInt(n) => TestValue::Int(*n),
            Value::Float(f) => TestValue::Float(*f),
            Value::String(s) => TestValue::Str(s.clone()),
            Value::Symbol(s) => TestValue::Symbol(s.clone()),
            other => panic!("constant {} is not a plain value", other),
        }
    }

    fn get_local(&mut self, slot: usize) {
        let value = self.locals.get(slot).cloned().unwrap_or(TestValue::Nil);
        self.stack.push(value);
    }

    fn set_local(&mut self, slot: usize) {
        let value = self.stack.last().cloned().expect("stack underflow");
        if self.locals.len() <= slot {
            self.locals.resize(slot + 1, TestValue::Nil);
        }
        self.locals[slot] = value;
    }

    fn jump(&mut self, taken: bool) {
        let distance = self.short();
        if taken {
            self.ip += distance;
        }
    }

    fn execute(&mut self) -> Outcome {
        use OpCode::*;

        loop {
            let op = OpCode::from_u8(self.byte()).expect("invalid opcode");
            match op {
                Noop => {}
                Pop => {
                    self.pop();
                }
                Dup => {
                    let top = self.stack.last().cloned().expect("stack underflow");
                    self.stack.push(top);
                }
                Nil | SelfValue => self.stack.push(TestValue::Nil),
                True => self.stack.push(TestValue::Bool(true)),
                False => self.stack.push(TestValue::Bool(false)),
                LoadInt0 | LoadInt1 | LoadInt2 | LoadInt3 | LoadInt4 | LoadInt5 => {
                    let value = (op as u8 - LoadInt0 as u8) as i64;
                    self.stack.push(TestValue::Int(value));
                }
                LoadInt8 => {
                    let value = self.byte() as i8;
                    self.stack.push(TestValue::Int(value as i64));
                }
                LoadValue0 | LoadValue1 | LoadValue2 | LoadValue3 => {
                    let value = self.constant((op as u8 - LoadValue0 as u8) as usize);
                    self.stack.push(value);
                }
                LoadValue8 => {
                    let index = self.byte() as usize;
                    let value = self.constant(index);
                    self.stack.push(value);
                }
                LoadValue16 => {
                    let index = self.short();
                    let value = self.constant(index);
                    self.stack.push(value);
                }
                PrepLocals8 | PrepLocals16 => {
                    let count = if op == PrepLocals8 {
                        self.byte() as usize
                    } else {
                        self.short()
                    };
                    self.locals.resize(count + 1, TestValue::Nil);
                }
                GetLocal1 | GetLocal2 | GetLocal3 | GetLocal4 => {
                    self.get_local((op as u8 - GetLocal1 as u8) as usize + 1)
                }
                GetLocal8 => {
                    let slot = self.byte() as usize;
                    self.get_local(slot);
                }
                GetLocal16 => {
                    let slot = self.short();
                    self.get_local(slot);
                }
                SetLocal1 | SetLocal2 | SetLocal3 | SetLocal4 => {
                    self.set_local((op as u8 - SetLocal1 as u8) as usize + 1)
                }
                SetLocal8 => {
                    let slot = self.byte() as usize;
                    self.set_local(slot);
                }
                SetLocal16 => {
                    let slot = self.short();
                    self.set_local(slot);
                }
                GetConst8 | GetConst16 => {
                    let index = if op == GetConst8 {
                        self.byte() as usize
                    } else {
                        self.short()
                    };
                    match self.constant(index) {
                        TestValue::Symbol(name) => self.stack.push(TestValue::Class(name)),
                        other => panic!("GET_CONST operand is not a symbol: {:?}", other),
                    }
                }
                Add | Subtract | Multiply | Less | LessEqual | Greater | GreaterEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    let (TestValue::Int(a), TestValue::Int(b)) = (&left, &right) else {
                        panic!("{} on {:?} and {:?}", op.name(), left, right);
                    };
                    let result = match op {
                        Add => TestValue::Int(a + b),
                        Subtract => TestValue::Int(a - b),
                        Multiply => TestValue::Int(a * b),
                        Less => TestValue::Bool(a < b),
                        LessEqual => TestValue::Bool(a <= b),
                        Greater => TestValue::Bool(a > b),
                        _ => TestValue::Bool(a >= b),
                    };
                    self.stack.push(result);
                }
                Equal | NotEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.stack
                        .push(TestValue::Bool((left == right) == (op == Equal)));
                }
                Not => {
                    let value = self.pop();
                    self.stack.push(TestValue::Bool(!value.truthy()));
                }
                Negate => match self.pop() {
                    TestValue::Int(n) => self.stack.push(TestValue::Int(-n)),
                    other => panic!("NEGATE on {:?}", other),
                },
                Jump => self.jump(true),
                Loop => {
                    let distance = self.short();
                    self.ip -= distance;
                }
                JumpUnless => {
                    let taken = !self.pop().truthy();
                    self.jump(taken);
                }
                JumpIf => {
                    let taken = self.pop().truthy();
                    self.jump(taken);
                }
                JumpUnlessNp => {
                    let taken = !self.stack.last().is_some_and(TestValue::truthy);
                    self.jump(taken);
                }
                JumpIfNp => {
                    let taken = self.stack.last().is_some_and(TestValue::truthy);
                    self.jump(taken);
                }
                NewList8 | NewList16 | NewTuple8 | NewTuple16 => {
                    let count = if matches!(op, NewList8 | NewTuple8) {
                        self.byte() as usize
                    } else {
                        self.short()
                    };
                    let items = self.pop_n(count);
                    self.stack.push(if matches!(op, NewList8 | NewList16) {
                        TestValue::List(items)
                    } else {
                        TestValue::Tuple(items)
                    });
                }
                NewMap8 | NewMap16 => {
                    let count = if op == NewMap8 {
                        self.byte() as usize
                    } else {
                        self.short()
                    };
                    let flat = self.pop_n(count * 2);
                    let pairs = flat
                        .chunks(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect();
                    self.stack.push(TestValue::Map(pairs));
                }
                Subscript => {
                    let index = self.pop();
                    let collection = self.pop();
                    self.stack.push(subscript(&collection, &index));
                }
                IsA => {
                    let class = self.pop();
                    let value = self.pop();
                    let TestValue::Class(class) = class else {
                        panic!("IS_A against {:?}", class);
                    };
                    let matches = matches!(
                        (&value, class.as_str()),
                        (TestValue::List(_), "Root::Std::List")
                            | (TestValue::Tuple(_), "Root::Std::Tuple")
                            | (TestValue::Map(_), "Root::Std::Map")
                    );
                    self.stack.push(TestValue::Bool(matches));
                }
                Len => {
                    let len = match self.pop() {
                        TestValue::List(items) | TestValue::Tuple(items) => items.len(),
                        TestValue::Map(pairs) => pairs.len(),
                        other => panic!("LEN on {:?}", other),
                    };
                    self.stack.push(TestValue::Int(len as i64));
                }
                HasKey => {
                    let key = self.pop();
                    let found = match self.pop() {
                        TestValue::Map(pairs) => pairs.iter().any(|(k, _)| *k == key),
                        other => panic!("HAS_KEY on {:?}", other),
                    };
                    self.stack.push(TestValue::Bool(found));
                }
                Slice => {
                    let start = self.byte() as usize;
                    let trailing = self.byte() as usize;
                    let items = match self.pop() {
                        TestValue::List(items) | TestValue::Tuple(items) => items,
                        other => panic!("SLICE on {:?}", other),
                    };
                    let end = items.len() - trailing;
                    self.stack.push(TestValue::List(items[start..end].to_vec()));
                }
                Instantiate8 => {
                    let argc = self.byte() as usize;
                    let args = self.pop_n(argc);
                    let TestValue::Class(class) = self.pop() else {
                        panic!("INSTANTIATE8 without a class");
                    };
                    self.stack.push(TestValue::Instance { class, args });
                }
                Throw => return Outcome::Thrown(self.pop()),
                Return => return Outcome::Returned(self.pop()),
                other => panic!("the test machine does not run {}", other.name()),
            }
        }
    }
}

fn subscript(collection: &TestValue, index: &TestValue) -> TestValue {
    match (collection, index) {
        (TestValue::List(items) | TestValue::Tuple(items), TestValue::Int(i)) => {
            let len = items.len() as i64;
            let at = if *i < 0 { len + i } else { *i };
            usize::try_from(at)
                .ok()
                .and_then(|at| items.get(at))
                .cloned()
                .unwrap_or(TestValue::Nil)
        }
        (TestValue::Map(pairs), key) => pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or(TestValue::Nil),
        _ => panic!("SUBSCRIPT on {:?} with {:?}", collection, index),
    }
}
