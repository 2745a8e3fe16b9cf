//! The bundled core library (section 4.9): Quill source text evaluated
//! into a fresh session, on top of the native builtins, before the session
//! is handed to a caller. Everything here could in principle be a native
//! builtin; it lives as source instead because it only needs what's
//! already a `Value` — first-class functions, `cons`/`first`/`rest`,
//! special forms — and writing it in Quill is how `defn`, `when`, `cond`,
//! and friends stay ordinary macros rather than privileged compiler
//! syntax (anything defined here is exactly as inspectable/overridable as
//! something a user `def`s at a REPL).
//!
//! No reader-level auto-gensym (`sym#`) exists in this dialect (see
//! `quill_reader::quasiquote`'s doc comment for the other syntax-quote
//! simplifications), so the handful of macros below that need a scratch
//! binding (`and`, `or`) spell it with a name unlikely to collide rather
//! than a hygienic one. Lexical shadowing still makes nested uses safe:
//! each expansion's `let` introduces its own slot, so an inner `and`
//! shadows an outer one's temporary correctly even though both are spelled
//! the same way.

pub const SOURCE: &str = r#"
(defmacro defn [name & fdecl]
  (let [docstring (if (string? (first fdecl)) (first fdecl) nil)
        fdecl (if docstring (rest fdecl) fdecl)
        clauses (if (vector? (first fdecl)) (list fdecl) fdecl)]
    (if docstring
      `(def ~name ~docstring (fn ~name ~@clauses))
      `(def ~name (fn ~name ~@clauses)))))

(defn not [x] (if x false true))

(defmacro when [test & body]
  `(if ~test (do ~@body)))

(defmacro when-not [test & body]
  `(if ~test nil (do ~@body)))

(defmacro if-not
  ([test then] `(if ~test nil ~then))
  ([test then else] `(if ~test ~else ~then)))

(defmacro and
  ([] true)
  ([x] x)
  ([x & rest] `(let [and_tmp__ ~x] (if and_tmp__ (and ~@rest) and_tmp__))))

(defmacro or
  ([] nil)
  ([x] x)
  ([x & rest] `(let [or_tmp__ ~x] (if or_tmp__ or_tmp__ (or ~@rest)))))

(defmacro cond [& clauses]
  (when (seq clauses)
    `(if ~(first clauses)
       ~(first (rest clauses))
       (cond ~@(rest (rest clauses))))))

(defmacro -> [x & forms]
  (if (seq forms)
    (let [form (first forms)
          threaded (if (seq? form)
                     (cons (first form) (cons x (rest form)))
                     (list form x))]
      (recur threaded (rest forms)))
    x))

(defmacro ->> [x & forms]
  (if (seq forms)
    (let [form (first forms)
          threaded (if (seq? form)
                     (concat form (list x))
                     (list form x))]
      (recur threaded (rest forms)))
    x))

(defn identity [x] x)

(defn constantly [x] (fn [& args] x))

(defn complement [f] (fn [& args] (not (apply f args))))

(defn comp
  ([] identity)
  ([f] f)
  ([f g] (fn [& args] (f (apply g args))))
  ([f g & more] (reduce comp (cons f (cons g more)))))

(defn partial
  ([f] f)
  ([f a] (fn [& args] (apply f a args)))
  ([f a b] (fn [& args] (apply f a b args)))
  ([f a b c] (fn [& args] (apply f a b c args)))
  ([f a b c & more] (fn [& args] (apply f a b c (concat more args)))))

(defn second [coll] (first (rest coll)))

(defn next [coll] (seq (rest coll)))

(defn last [coll]
  (loop [s (seq coll)]
    (let [n (next s)]
      (if n (recur n) (first s)))))

(defn reduce
  ([f coll]
    (let [s (seq coll)]
      (if s
        (reduce f (first s) (rest s))
        (f))))
  ([f init coll]
    (loop [acc init s (seq coll)]
      (if s
        (let [v (f acc (first s))]
          (if (reduced? v) (unreduced v) (recur v (rest s))))
        acc))))

(defn map
  ([f coll]
    (lazy-seq
      (let [s (seq coll)]
        (when s
          (cons (f (first s)) (map f (rest s)))))))
  ([f c1 c2]
    (lazy-seq
      (let [s1 (seq c1) s2 (seq c2)]
        (when (and s1 s2)
          (cons (f (first s1) (first s2)) (map f (rest s1) (rest s2))))))))

(defn filter [pred coll]
  (lazy-seq
    (let [s (seq coll)]
      (when s
        (let [x (first s)]
          (if (pred x)
            (cons x (filter pred (rest s)))
            (filter pred (rest s))))))))

(defn remove [pred coll]
  (filter (complement pred) coll))

(defn take [n coll]
  (lazy-seq
    (when (pos? n)
      (let [s (seq coll)]
        (when s
          (cons (first s) (take (dec n) (rest s))))))))

(defn take-while [pred coll]
  (lazy-seq
    (let [s (seq coll)]
      (when s
        (when (pred (first s))
          (cons (first s) (take-while pred (rest s))))))))

(defn drop [n coll]
  (loop [n n s (seq coll)]
    (if (and s (pos? n))
      (recur (dec n) (next s))
      s)))

(defn drop-while [pred coll]
  (loop [s (seq coll)]
    (if (and s (pred (first s)))
      (recur (next s))
      s)))

(defn range
  ([end] (range 0 end 1))
  ([start end] (range start end 1))
  ([start end step]
    (lazy-seq
      (when (if (pos? step) (< start end) (> start end))
        (cons start (range (+ start step) end step))))))

(defn iterate [f x]
  (cons x (lazy-seq (iterate f (f x)))))

(defn repeat
  ([x] (cons x (lazy-seq (repeat x))))
  ([n x] (take n (repeat x))))

(defn every? [pred coll]
  (loop [s (seq coll)]
    (if s
      (if (pred (first s))
        (recur (rest s))
        false)
      true)))

(defn some [pred coll]
  (loop [s (seq coll)]
    (when s
      (let [v (pred (first s))]
        (if v v (recur (rest s)))))))

"#;

#[cfg(test)]
mod tests {
    use crate::bridge::new_session;

    #[test]
    fn core_lib_source_loads_without_error() {
        new_session().expect("core library must load cleanly");
    }
}
